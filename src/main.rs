use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    note_discovery::init_tracing();
    note_discovery::run(note_discovery::Options::parse()).await
}

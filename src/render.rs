use serde::{Deserialize, Serialize};

/// Default visible-list length above which rows are windowed.
pub const DEFAULT_VIRTUALIZATION_THRESHOLD: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderStrategy {
    Windowed,
    FullList,
}

/// Pick a rendering strategy for the list currently on screen.
///
/// Pass the length of the *visible* list (after filtering and grouping), not the
/// size of the whole collection: a large collection can still produce a short
/// list while searching. Call again on every render.
pub fn decide(candidate_count: usize, threshold: usize) -> RenderStrategy {
    if candidate_count > threshold {
        RenderStrategy::Windowed
    } else {
        RenderStrategy::FullList
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundaries() {
        let t = DEFAULT_VIRTUALIZATION_THRESHOLD;
        assert_eq!(decide(0, t), RenderStrategy::FullList);
        assert_eq!(decide(49, t), RenderStrategy::FullList);
        assert_eq!(decide(50, t), RenderStrategy::FullList);
        assert_eq!(decide(51, t), RenderStrategy::Windowed);
    }
}

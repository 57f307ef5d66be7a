/// Process-wide-looking but explicitly-threaded tuning knob (spec §9): the
/// maximum number of bytes a request planner will over-fetch rather than
/// issue a second range request.
///
/// Observed by both the traversal coalescer (`packed_rtree::StreamSearch`,
/// which takes it directly) and the feature-batch planner in
/// [`crate::reader`]/[`crate::http_reader`]. There is deliberately no
/// process-global default: every `Reader`/`AsyncReader` is opened with an
/// explicit `Config`, so two readers in the same process can never silently
/// share tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub extra_request_threshold: usize,
}

impl Config {
    pub fn new(extra_request_threshold: usize) -> Self {
        Self {
            extra_request_threshold,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extra_request_threshold: 256 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec() {
        assert_eq!(Config::default().extra_request_threshold, 262_144);
    }
}

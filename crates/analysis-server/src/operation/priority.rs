//
// operation/priority.rs
//
// Queue ordering bands
//

/// Strict total order over operation categories, highest first.
///
/// Only meaningful inside the queue. The derived `Ord` follows declaration
/// order, so a *smaller* value is a *higher* priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationPriority {
    Server,
    ContextChange,
    ContextNotification,
    ContextAnalysisPriorityContinue,
    ContextAnalysisPriority,
    ContextAnalysisContinue,
    ContextAnalysis,
}

impl OperationPriority {
    pub const COUNT: usize = 7;

    /// Every band, highest first.
    pub const ALL: [OperationPriority; Self::COUNT] = [
        OperationPriority::Server,
        OperationPriority::ContextChange,
        OperationPriority::ContextNotification,
        OperationPriority::ContextAnalysisPriorityContinue,
        OperationPriority::ContextAnalysisPriority,
        OperationPriority::ContextAnalysisContinue,
        OperationPriority::ContextAnalysis,
    ];

    /// Position of the band's bucket in the queue.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Band for a `PerformAnalysis` pass.
    pub fn for_analysis(has_priority_sources: bool, continue_pass: bool) -> Self {
        match (has_priority_sources, continue_pass) {
            (true, true) => OperationPriority::ContextAnalysisPriorityContinue,
            (true, false) => OperationPriority::ContextAnalysisPriority,
            (false, true) => OperationPriority::ContextAnalysisContinue,
            (false, false) => OperationPriority::ContextAnalysis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_order_is_priority_order() {
        for pair in OperationPriority::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should outrank {:?}", pair[0], pair[1]);
        }
        for (i, priority) in OperationPriority::ALL.iter().enumerate() {
            assert_eq!(priority.index(), i);
        }
    }

    #[test]
    fn test_analysis_bands() {
        use OperationPriority::*;
        assert_eq!(OperationPriority::for_analysis(true, true), ContextAnalysisPriorityContinue);
        assert_eq!(OperationPriority::for_analysis(true, false), ContextAnalysisPriority);
        assert_eq!(OperationPriority::for_analysis(false, true), ContextAnalysisContinue);
        assert_eq!(OperationPriority::for_analysis(false, false), ContextAnalysis);
        // Change and notification work for any context outranks every analysis band.
        assert!(ContextNotification < ContextAnalysisPriorityContinue);
    }
}

use serde::{Deserialize, Serialize};

/// Job lifecycle states. The serialized names are wire-visible and part of
/// the API contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Created,
    Waiting,
    Printing,
    Finished,
    Done,
    Unknown,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "Created",
            JobState::Waiting => "Waiting",
            JobState::Printing => "Printing",
            JobState::Finished => "Finished",
            JobState::Done => "Done",
            JobState::Unknown => "Unknown",
        }
    }

    pub fn parse(raw: &str) -> JobState {
        match raw {
            "Created" => JobState::Created,
            "Waiting" => JobState::Waiting,
            "Printing" => JobState::Printing,
            "Finished" => JobState::Finished,
            "Done" => JobState::Done,
            _ => JobState::Unknown,
        }
    }

    /// Legality table for the state machine. Every transition the dispatcher
    /// or the wire can trigger goes through this check first; anything else
    /// is an `InvalidTransition`.
    pub fn can_transition(self, to: JobState) -> bool {
        matches!(
            (self, to),
            (JobState::Created, JobState::Waiting)
                | (JobState::Waiting, JobState::Printing)
                | (JobState::Printing, JobState::Finished)
                | (JobState::Finished, JobState::Done)
                | (JobState::Finished, JobState::Waiting)
                | (JobState::Done, JobState::Waiting)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Printer states as reported over the wire. `Print finished` keeps its
/// space because the string is part of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrinterState {
    Offline,
    Ready,
    Printing,
    Paused,
    #[serde(rename = "Print finished")]
    PrintFinished,
    Busy,
    Error,
    Unknown,
}

impl PrinterState {
    pub const ALL: [PrinterState; 8] = [
        PrinterState::Offline,
        PrinterState::Ready,
        PrinterState::Printing,
        PrinterState::Paused,
        PrinterState::PrintFinished,
        PrinterState::Busy,
        PrinterState::Error,
        PrinterState::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrinterState::Offline => "Offline",
            PrinterState::Ready => "Ready",
            PrinterState::Printing => "Printing",
            PrinterState::Paused => "Paused",
            PrinterState::PrintFinished => "Print finished",
            PrinterState::Busy => "Busy",
            PrinterState::Error => "Error",
            PrinterState::Unknown => "Unknown",
        }
    }

    pub fn parse(raw: &str) -> PrinterState {
        match raw {
            "Offline" => PrinterState::Offline,
            "Ready" => PrinterState::Ready,
            "Printing" => PrinterState::Printing,
            "Paused" => PrinterState::Paused,
            "Print finished" => PrinterState::PrintFinished,
            "Busy" => PrinterState::Busy,
            "Error" => PrinterState::Error,
            _ => PrinterState::Unknown,
        }
    }

    /// A printer in an operational state can hold a job and report on it.
    pub fn is_operational(self) -> bool {
        matches!(
            self,
            PrinterState::Ready
                | PrinterState::Printing
                | PrinterState::Paused
                | PrinterState::PrintFinished
                | PrinterState::Busy
        )
    }
}

impl std::fmt::Display for PrinterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_happy_path_is_legal() {
        assert!(JobState::Created.can_transition(JobState::Waiting));
        assert!(JobState::Waiting.can_transition(JobState::Printing));
        assert!(JobState::Printing.can_transition(JobState::Finished));
        assert!(JobState::Finished.can_transition(JobState::Done));
    }

    #[test]
    fn job_retry_and_reprint_are_legal() {
        assert!(JobState::Finished.can_transition(JobState::Waiting));
        assert!(JobState::Done.can_transition(JobState::Waiting));
    }

    #[test]
    fn job_illegal_transitions_rejected() {
        assert!(!JobState::Created.can_transition(JobState::Printing));
        assert!(!JobState::Waiting.can_transition(JobState::Finished));
        assert!(!JobState::Waiting.can_transition(JobState::Done));
        assert!(!JobState::Printing.can_transition(JobState::Waiting));
        assert!(!JobState::Done.can_transition(JobState::Done));
        assert!(!JobState::Done.can_transition(JobState::Printing));
        assert!(!JobState::Unknown.can_transition(JobState::Waiting));
    }

    #[test]
    fn state_names_round_trip() {
        for s in [
            JobState::Created,
            JobState::Waiting,
            JobState::Printing,
            JobState::Finished,
            JobState::Done,
        ] {
            assert_eq!(JobState::parse(s.as_str()), s);
        }
        assert_eq!(JobState::parse("garbage"), JobState::Unknown);
    }

    #[test]
    fn print_finished_keeps_its_space() {
        assert_eq!(PrinterState::PrintFinished.as_str(), "Print finished");
        assert_eq!(
            PrinterState::parse("Print finished"),
            PrinterState::PrintFinished
        );
        assert_eq!(
            serde_json::to_string(&PrinterState::PrintFinished).unwrap(),
            "\"Print finished\""
        );
    }

    #[test]
    fn operational_flags() {
        assert!(PrinterState::Ready.is_operational());
        assert!(PrinterState::Printing.is_operational());
        assert!(PrinterState::Paused.is_operational());
        assert!(PrinterState::PrintFinished.is_operational());
        assert!(PrinterState::Busy.is_operational());
        assert!(!PrinterState::Offline.is_operational());
        assert!(!PrinterState::Error.is_operational());
        assert!(!PrinterState::Unknown.is_operational());
    }
}

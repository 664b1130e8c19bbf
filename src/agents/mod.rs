mod registry;
pub mod transcripts;

pub use registry::{
    binary_on_path, AgentKind, AgentProfile, AutoApprove, LaunchCommand, Program, RegistryError,
    ResumeStyle, TranscriptLayout,
};
pub use transcripts::ResumeCandidate;

//! Event model, buffer disciplines, source protocol and result types
//! shared by every concrete source and by the verifier service.

pub mod eth_block;
pub mod ethereum_buffer;
pub mod microblog_buffer;
pub mod radio_buffer;
pub mod radio_frame;
pub mod result;
pub mod seism_event;
pub mod seismology_buffer;
pub mod source;
pub mod tweet;

pub use eth_block::EthBlock;
pub use ethereum_buffer::EthereumBuffer;
pub use microblog_buffer::MicroblogBuffer;
pub use radio_buffer::RadioBuffer;
pub use radio_frame::{FrameHeader, FrameParseError, MpegVersion, RadioFrame};
pub use result::{
    ExtValueBit, PulseException, PulseResult, PulseStatus, VerifierException, VerifierResult,
    VerifierStatus,
};
pub use seism_event::SeismEvent;
pub use seismology_buffer::SeismologyBuffer;
pub use source::{run_collector, Source, SourceState, VerifyParams, RESTART_DELAY};
pub use tweet::Tweet;

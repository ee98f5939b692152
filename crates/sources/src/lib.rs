//! Concrete collectors and verifiers for each of the beacon's four
//! public event streams: radio, microblog, seismology, and ethereum.

pub mod ethereum;
pub mod microblog;
pub mod radio;
pub mod seismology;

pub use ethereum::{EthereumConfig, EthereumSource};
pub use microblog::{MicroblogConfig, MicroblogSource};
pub use radio::{RadioConfig, RadioSource};
pub use seismology::{SeismologyConfig, SeismologySource};

//! Core engine for a single-host, high-rate, stateless network scanner:
//! cyclic-group target enumeration, keyed-PRF send/receive validation, a
//! paged dedup bitmap, bounded retransmission, and the probe/output module
//! contracts the send and receive engines are written against.

pub mod address_space;
pub mod audit;
pub mod backend;
pub mod bitmap;
pub mod config;
pub mod error;
pub mod fieldset;
pub mod iterator;
pub mod output;
pub mod packet;
pub mod probe;
pub mod recv;
pub mod retransmit;
pub mod send;
pub mod state;
pub mod supervisor;
pub mod validator;

pub use config::Config;
pub use error::{Error, Result};
pub use fieldset::{FieldSet, FieldValue};
pub use output::OutputModule;
pub use probe::ProbeModule;

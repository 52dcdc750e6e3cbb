pub mod config;
pub mod error;
pub mod logging;
pub mod record;
pub mod resolver;
pub mod text;
pub mod types;

pub use config::RecordConfig;
pub use error::{NormalizeError, Result};
pub use record::{CanonicalRecord, Flag, ObjectType, Rooms};
pub use resolver::{FieldOp, FieldResolver, MatchMode};
pub use types::{FinalizeOutcome, RawValue, RejectReason, Table, TableRow};

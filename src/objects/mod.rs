//! Object-use collaborator: tagged objects, the shared table the rule
//! evaluator reads, and the detector thread that keeps it current.

pub mod detector;
pub mod table;

pub use detector::{
    ChannelTagSource, NoopTagSource, ObjectAggregator, ObjectDetector, TagRead, TagSource,
};
pub use table::{ObjectTable, SharedObjectTable, TaggedObject};

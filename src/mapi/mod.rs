//! The MAPI vocabulary shared by every layer: identifiers, property tags and
//! values, restrictions and status codes.

mod error;
mod ids;
mod restriction;
pub mod tags;
mod value;

pub use error::MapiError;
pub use ids::FolderId;
pub use ids::MessageId;
pub use ids::ReplicaId;
pub use restriction::FuzzyLevel;
pub use restriction::Relop;
pub use restriction::Restriction;
pub use restriction::SortOrder;
pub use restriction::compare_sort_keys;
pub use tags::PropTag;
pub use tags::PropType;
pub use value::PropResult;
pub use value::PropValue;
pub use value::PropertyRow;

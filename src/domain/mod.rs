pub mod tab;
pub mod types;

pub use tab::{TabDescriptor, TabId, TabStatus, WindowId};
pub use types::{PageInfo, Verdict};

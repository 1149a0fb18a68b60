pub mod events;
pub mod host;
pub mod native;

pub use events::TabEventSubscriber;
pub use host::BrowserHost;
pub use native::NativeHost;

pub mod dump;
pub mod publish;
pub mod store;

pub use dump::handle_dump;
pub use publish::handle_publish;
pub use store::handle_store;

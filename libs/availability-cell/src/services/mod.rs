pub mod exceptions;
pub mod search;
pub mod slots;
pub mod stores;
pub mod template;

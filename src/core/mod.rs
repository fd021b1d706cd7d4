// Core modules implementing storage, the two record formats, and error modeling.
pub mod catalog;
pub mod error;
pub mod products;
pub mod store;

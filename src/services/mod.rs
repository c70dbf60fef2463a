pub mod derivatives;
pub mod entity_names;
pub mod storage;
pub mod templates;
pub mod worker;

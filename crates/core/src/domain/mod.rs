pub mod catalog_item;
pub mod estimate;
pub mod money;
pub mod selection;
pub mod template;

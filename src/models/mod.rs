mod catalog;
mod category;
mod group;
mod item;
mod metadata;

pub use catalog::{Catalog, CatalogFileError};
pub use category::Category;
pub use group::Group;
pub use item::{Item, ItemKind, ItemKindTag};
pub use metadata::NodeMetadata;

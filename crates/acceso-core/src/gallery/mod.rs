pub mod memory;
pub mod store;

pub use memory::MemoryGallery;
pub use store::{
    EnvGalleryDirResolver, FilesystemGallery, GalleryDirResolver, GalleryStore, SampleRef,
    DEFAULT_GALLERY_DIR, GALLERY_DIR_ENV,
};

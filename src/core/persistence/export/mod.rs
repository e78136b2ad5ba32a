pub mod raw_view_fs_adapter;

pub use raw_view_fs_adapter::RawViewFsAdapter;

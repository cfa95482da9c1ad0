//! Feature writes, removal and every search entry point of a layer.

mod layer_search_test;
mod layer_write_test;

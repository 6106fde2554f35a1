mod session_store_mem;

pub use session_store_mem::*;

pub mod active_ops;

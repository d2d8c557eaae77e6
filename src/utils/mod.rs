pub mod debounce;
pub mod time_handling;

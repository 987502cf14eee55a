mod time;

pub use time::{LocalTimer, download_file_name};

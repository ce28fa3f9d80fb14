pub mod authored;
pub mod excel_read;
pub mod excel_write;

pub use excel_read::decode;
pub use excel_write::encode;

pub mod MappedFile;
pub mod SerialPort;

pub use MappedFile::{create_mapped_file, existing_len, MappingBackend};
pub use SerialPort::open_serial_port;

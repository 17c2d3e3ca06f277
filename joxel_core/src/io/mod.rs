//! Typed binary readers and writers with explicit byte order.

mod value_reader;
mod value_reader_slice;
mod value_writer;
mod value_writer_blob;

pub use value_reader::{SeekRead, ValueReader};
pub use value_reader_slice::ValueReaderSlice;
pub use value_writer::ValueWriter;
pub use value_writer_blob::ValueWriterBlob;

pub mod csv_sink;
pub mod downloader;
pub mod failure_log;

pub use csv_sink::CsvSink;
pub use downloader::InvoiceDownloader;
pub use failure_log::FailureLog;

use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from I/O operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from writing or reading CSV records
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from the capture file reader
    #[error("PCAP error: {0}")]
    PcapError(#[from] pcap_file::PcapError),

    /// Error from packet parsing
    #[error("Packet parsing error: {0}")]
    PacketParsingError(String),

    /// Invalid configuration, reported at startup
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error reading interface counters
    #[error("Counter error: {0}")]
    CounterError(String),

    /// Error from an active probe
    #[error("Probe error: {0}")]
    ProbeError(String),

    /// Error from monitor lifecycle operations
    #[error("Monitor error: {0}")]
    MonitorError(String),
}

/// Result type for application
pub type AppResult<T> = Result<T, AppError>;

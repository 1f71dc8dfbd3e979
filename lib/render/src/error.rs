use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to fetch {reference}: {message}")]
    Fetch { reference: String, message: String },

    #[error("Failed to fetch {reference}: HTTP {status}")]
    Status { reference: String, status: u16 },

    #[error("Timed out fetching {reference}")]
    Timeout { reference: String },

    #[error("Failed to decode {reference}: {source}")]
    Decode {
        reference: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Nothing to render: layout has no cells")]
    EmptyLayout,

    #[error("Canvas too large: {rows}x{columns} cells of {cell_size}px")]
    CanvasTooLarge {
        rows: usize,
        columns: usize,
        cell_size: u32,
    },

    #[error("Image encoding error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

use image::ImageFormat;

/// Why an attachment could not be brought under the upload ceiling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("attachment is not a recognised image")]
    UnknownFormat,

    #[error("animated {0:?} would lose its frames if resized")]
    Animated(ImageFormat),

    #[error("could not read image data")]
    Read(#[source] std::io::Error),

    #[error("could not decode {format:?} image")]
    Decode {
        format: ImageFormat,
        #[source]
        source: image::ImageError,
    },

    #[error("could not re-encode image as {format:?}")]
    Encode {
        format: ImageFormat,
        #[source]
        source: image::ImageError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

//! Background removal seam.
//!
//! Separating the subject from its background is an external capability
//! (a segmentation model, a remote service, a hand-made cutout). The
//! pipeline only needs its result: the same image with background
//! pixels' alpha set to 0. [`BackgroundRemover`] is that contract.
//!
//! Failures are reported as [`CollaboratorError`] and propagated
//! unchanged; the pipeline never retries.

use serde::{Deserialize, Serialize};

use crate::types::RgbaImage;

/// Failure reported by an external collaborator.
///
/// Carries the collaborator's human-readable message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct CollaboratorError {
    message: String,
}

impl CollaboratorError {
    /// Wrap a collaborator's failure message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The collaborator's message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Produces an alpha mask for the subject of an image.
///
/// Implementations receive ownership of the buffer and return a buffer
/// of identical dimensions whose background pixels have alpha 0. No
/// guarantee is made about mask quality.
pub trait BackgroundRemover: Send + Sync {
    /// Remove the background from `image`.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the collaborator fails.
    fn remove_background(&self, image: RgbaImage) -> Result<RgbaImage, CollaboratorError>;
}

/// A remover that returns its input untouched.
///
/// Useful when the input already carries a meaningful alpha channel, or
/// when background removal is disabled and a remover is still required
/// by the API.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl BackgroundRemover for Passthrough {
    fn remove_background(&self, image: RgbaImage) -> Result<RgbaImage, CollaboratorError> {
        Ok(image)
    }
}

impl<F> BackgroundRemover for F
where
    F: Fn(RgbaImage) -> Result<RgbaImage, CollaboratorError> + Send + Sync,
{
    fn remove_background(&self, image: RgbaImage) -> Result<RgbaImage, CollaboratorError> {
        self(image)
    }
}

/// Run `remover` on `image` and check the dimension contract.
///
/// # Errors
///
/// Returns the collaborator's own error, or a [`CollaboratorError`] if
/// it returned a buffer of different dimensions.
pub fn apply<R: BackgroundRemover + ?Sized>(
    remover: &R,
    image: RgbaImage,
) -> Result<RgbaImage, CollaboratorError> {
    let expected = image.dimensions();
    let cutout = remover.remove_background(image)?;
    if cutout.dimensions() != expected {
        return Err(CollaboratorError::new(format!(
            "background removal returned {}x{}, expected {}x{}",
            cutout.width(),
            cutout.height(),
            expected.0,
            expected.1,
        )));
    }
    Ok(cutout)
}

use crate::error::TrackError;
use crate::rect::Rect;

/*------------------------------------------------------------------------------
Detection struct
------------------------------------------------------------------------------*/

/// One detector output box for a single frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub rect: Rect<f32>,
    pub confidence: f32,
    pub class_id: i32,
    /// Unit-norm appearance vector, present when re-identification is enabled.
    pub embedding: Option<Vec<f32>>,
}

impl Detection {
    pub fn new(rect: Rect<f32>, confidence: f32, class_id: i32) -> Self {
        Self {
            rect,
            confidence,
            class_id,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Frame-boundary validation. `expected_dim` is the embedding dimension
    /// locked in by the first embedding the tracker ever saw.
    pub(crate) fn validate(
        &self,
        expected_dim: Option<usize>,
    ) -> Result<(), TrackError> {
        if !self.confidence.is_finite() {
            return Err(TrackError::InvalidInput(format!(
                "non-finite confidence {}",
                self.confidence
            )));
        }
        let (w, h) = (self.rect.width(), self.rect.height());
        if !w.is_finite() || !h.is_finite() || w <= 0.0 || h <= 0.0 {
            return Err(TrackError::InvalidInput(format!(
                "invalid box dimensions {}x{}",
                w, h
            )));
        }
        if let (Some(embedding), Some(dim)) = (&self.embedding, expected_dim) {
            if embedding.len() != dim {
                return Err(TrackError::InvalidInput(format!(
                    "embedding dimension {} does not match {}",
                    embedding.len(),
                    dim
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_plain_detection() {
        let det = Detection::new(Rect::new(0.0, 0.0, 10.0, 20.0), 0.9, 0);
        assert!(det.validate(None).is_ok());
    }

    #[test]
    fn test_validate_rejects_nan_confidence() {
        let det =
            Detection::new(Rect::new(0.0, 0.0, 10.0, 20.0), f32::NAN, 0);
        assert!(det.validate(None).is_err());
    }

    #[test]
    fn test_validate_rejects_negative_dimensions() {
        let det = Detection::new(Rect::new(0.0, 0.0, -10.0, 20.0), 0.9, 0);
        assert!(det.validate(None).is_err());
    }

    #[test]
    fn test_validate_rejects_embedding_dim_mismatch() {
        let det = Detection::new(Rect::new(0.0, 0.0, 10.0, 20.0), 0.9, 0)
            .with_embedding(vec![1.0, 0.0, 0.0]);
        assert!(det.validate(Some(4)).is_err());
        assert!(det.validate(Some(3)).is_ok());
        assert!(det.validate(None).is_ok());
    }
}

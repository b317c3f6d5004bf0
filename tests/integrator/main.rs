#![allow(clippy::cast_precision_loss)]

mod accuracy;
mod budget;
mod failures;

use rapid_pe::prior::{ExtrinsicPrior, PriorDimension};
use rapid_pe::{IntrinsicPoint, PointId};

pub(crate) fn point(id: u64, params: Vec<f64>) -> IntrinsicPoint {
    IntrinsicPoint::new(PointId(id), params, 0, None)
}

pub(crate) fn box_prior(n_dims: usize, half_width: f64) -> ExtrinsicPrior {
    let mut builder = ExtrinsicPrior::builder();
    for d in 0..n_dims {
        builder = builder.dimension(
            format!("x{d}"),
            PriorDimension::uniform(-half_width, half_width).unwrap(),
        );
    }
    builder.build().unwrap()
}

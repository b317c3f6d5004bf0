//! Layout of the first generation in the unit cube.

use super::separation::SeparationIndex;
use crate::error::Result;
use crate::types::InitialDesign;

/// Dimensions covered by the Sobol direction numbers.
#[cfg(feature = "sobol")]
const SOBOL_MAX_DIMS: usize = 256;

/// Rejects a design that cannot lay out `n_dims` dimensions.
pub(crate) fn check_dims(design: InitialDesign, n_dims: usize) -> Result<()> {
    #[cfg(feature = "sobol")]
    if design == InitialDesign::Sobol && n_dims > SOBOL_MAX_DIMS {
        return Err(crate::error::Error::InvalidConfig {
            name: "initial_design",
            reason: format!("Sobol supports at most {SOBOL_MAX_DIMS} dimensions, got {n_dims}"),
        });
    }
    #[cfg(not(feature = "sobol"))]
    let _ = (design, n_dims);
    Ok(())
}

/// Draws up to `n` separated points in `[0, 1)^n_dims`.
///
/// Each slot gets `max_redraws + 1` attempts; a slot whose attempts all
/// land too close to earlier points is dropped.
pub(crate) fn initial_design(
    design: InitialDesign,
    n: usize,
    n_dims: usize,
    max_redraws: usize,
    rng: &mut fastrand::Rng,
    taken: &mut SeparationIndex,
) -> Vec<Vec<f64>> {
    let mut draw: Box<dyn FnMut() -> Vec<f64> + '_> = match design {
        InitialDesign::Random => Box::new(|| (0..n_dims).map(|_| rng.f64()).collect()),
        #[cfg(feature = "sobol")]
        InitialDesign::Sobol => {
            let scramble = rng.u32(..);
            let mut index: u32 = 0;
            Box::new(move || {
                let point = sobol_point(index, n_dims, scramble);
                index = index.wrapping_add(1);
                point
            })
        }
    };

    let mut points = Vec::with_capacity(n);
    for _ in 0..n {
        for _ in 0..=max_redraws {
            let x = draw();
            if taken.is_clear(&x) {
                taken.claim(x.clone());
                points.push(x);
                break;
            }
        }
    }
    points
}

/// One point of the Owen-scrambled Sobol sequence.
#[cfg(feature = "sobol")]
#[allow(clippy::cast_possible_truncation)]
fn sobol_point(index: u32, n_dims: usize, scramble: u32) -> Vec<f64> {
    (0..n_dims)
        .map(|d| f64::from(sobol_burley::sample(index, d as u32, scramble)))
        .collect()
}

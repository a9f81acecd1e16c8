//! Structural checks of a synthesized circuit against the game it solves.

use log::debug;

use crate::aiger::Circuit;
use crate::error::{Error, Result};

const METADATA_BEGIN: &str = "#!SYNTCOMP";
const METADATA_END: &str = "#.";

/// Check that `#!SYNTCOMP` ... `#.` metadata blocks are closed and not nested.
pub fn check_metadata(lines: &[String]) -> Result<()> {
    let mut open = false;
    for line in lines {
        if line.contains(METADATA_BEGIN) {
            if open {
                return Err(Error::SynthesisShape("invalid nesting of metadata labels".to_string()));
            }
            open = true;
        } else if line.contains(METADATA_END) {
            if !open {
                return Err(Error::SynthesisShape("metadata end label without a start label".to_string()));
            }
            open = false;
        }
    }
    if open {
        return Err(Error::SynthesisShape("metadata labels are not closed".to_string()));
    }
    Ok(())
}

/// Check that `synthesized` is a plausible solution of the game `original`:
/// the controllable inputs are gone and the uncontrollable ones are kept.
pub fn check_synthesis_shape(original: &Circuit, synthesized: &Circuit) -> Result<()> {
    check_metadata(original.comments())?;
    original.require_game_partition()?;

    check_metadata(synthesized.comments())?;
    let controlled = synthesized.controlled_inputs().len();
    if controlled != 0 {
        return Err(Error::SynthesisShape(format!(
            "{} controllable inputs are left after synthesis",
            controlled
        )));
    }
    let expected = original.uncontrolled_inputs().len();
    let actual = synthesized.uncontrolled_inputs().len();
    if actual != expected {
        return Err(Error::SynthesisShape(format!(
            "expected {} uncontrollable inputs after synthesis, got {}",
            expected, actual
        )));
    }

    debug!(
        "Synthesized circuit keeps {} uncontrollable inputs and adds {} latches",
        actual,
        synthesized.latches().len().saturating_sub(original.latches().len())
    );
    Ok(())
}

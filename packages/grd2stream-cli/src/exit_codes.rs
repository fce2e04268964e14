use grd2stream_rs::FlowlineError;

pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;
pub const PROVISIONING_ERROR: i32 = 3;
pub const PARTIAL_FAILURE: i32 = 4;

pub fn for_error(error: &FlowlineError) -> i32 {
    match error {
        FlowlineError::InvalidParameters(_) | FlowlineError::Config(_) => INPUT_ERROR,
        e if e.is_provisioning() => PROVISIONING_ERROR,
        _ => EXECUTION_ERROR,
    }
}

//! Built-in specialist workers.

mod diagnostician;
mod remediator;

pub use diagnostician::Diagnostician;
pub use remediator::Remediator;

use kubeagent_core::Payload;

fn input_str<'a>(input: &'a Payload, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| input.get(*k).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
}

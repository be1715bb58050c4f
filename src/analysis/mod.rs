pub mod blur;
pub mod fingerprint;
pub mod icon_match;
pub mod variation;

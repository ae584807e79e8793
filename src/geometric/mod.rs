pub mod land_cover;
pub mod watershed;

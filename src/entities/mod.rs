pub mod image_file;
pub mod regeneration_job;
pub mod size_template;

pub mod batch_crop;
pub mod crop_plan;
pub mod documents;
pub mod host;
pub mod script;
pub mod selection;
pub mod settings;

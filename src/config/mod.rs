//! Configuration module for Quarry.
//!
//! Handles the data source, execution defaults and metamodel location.

mod settings;

pub use settings::{
    expand_env_vars, ExecutionSettings, MetamodelSettings, Settings, SettingsError,
    SourceSettings,
};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::contract::model::{ClinicSettings, Record};

/// A per-user collection: its storage name and in-memory shape.
/// `Value::default()` is what a user with no saved data sees.
pub trait Collection {
    const NAME: &'static str;
    type Value: Serialize + DeserializeOwned + Default + Clone + Send + 'static;
}

pub struct Patients;
pub struct Appointments;
pub struct Finances;
pub struct Settings;

impl Collection for Patients {
    const NAME: &'static str = "patients";
    type Value = Vec<Record>;
}

impl Collection for Appointments {
    const NAME: &'static str = "appointments";
    type Value = Vec<Record>;
}

impl Collection for Finances {
    const NAME: &'static str = "finances";
    type Value = Vec<Record>;
}

impl Collection for Settings {
    const NAME: &'static str = "settings";
    type Value = ClinicSettings;
}

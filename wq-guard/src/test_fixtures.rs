//! Observation fixtures shared by unit tests.

use crate::model::{NumericField, Observation};
use crate::store::{DataFusionStore, StoreConfig};

/// Five readings over two dates. Temperature is missing on the last row,
/// salinity on the fourth and odo on the second.
pub fn sample_observations() -> Vec<Observation> {
    use NumericField::*;
    vec![
        Observation::on("03/14/21")
            .at(25.91, -80.14)
            .with(Temperature, 20.0)
            .with(Salinity, 35.0)
            .with(Odo, 6.5),
        Observation::on("03/14/21")
            .at(25.92, -80.14)
            .with(Temperature, 21.0)
            .with(Salinity, 35.5),
        Observation::on("03/15/21")
            .at(25.93, -80.15)
            .with(Temperature, 22.0)
            .with(Salinity, 36.0)
            .with(Odo, 7.0),
        Observation::on("03/15/21")
            .with(Temperature, 23.0)
            .with(Odo, 7.5),
        Observation::on("03/15/21")
            .with(Salinity, 34.0)
            .with(Odo, 8.0),
    ]
}

/// Observations with only `field` set, all on one date.
pub fn readings(field: NumericField, values: &[f64]) -> Vec<Observation> {
    values
        .iter()
        .map(|v| Observation::on("03/14/21").with(field, *v))
        .collect()
}

/// A [`DataFusionStore`] loaded with [`sample_observations`].
pub async fn sample_store() -> DataFusionStore {
    store_with(&sample_observations()).await
}

/// A [`DataFusionStore`] loaded with `observations`.
pub async fn store_with(observations: &[Observation]) -> DataFusionStore {
    DataFusionStore::from_observations(StoreConfig::default().with_target_partitions(2), observations)
        .await
        .expect("fixture store should load")
}

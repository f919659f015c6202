//! Built-in instruments and rack construction from configuration.
//!
//! Real device drivers live outside this crate and only need to implement
//! [`Instrument`](crate::core::Instrument). The instruments here cover dry
//! runs, tests and software-only signals.

pub mod mock;
pub mod software;

pub use mock::MockInstrument;
pub use software::{RandomGenerator, TimeKeeper};

use crate::config::{InstrumentDefinition, InstrumentKind, Settings};
use crate::core::{Instrument, InstrumentRack};
use std::sync::Arc;

/// Construct the built-in instrument described by `def`.
pub fn from_definition(def: &InstrumentDefinition) -> Arc<dyn Instrument> {
    match def.kind {
        InstrumentKind::Mock => {
            let mut mock = MockInstrument::new(def.name.clone());
            for (name, value) in &def.parameters {
                mock = mock.with_parameter(name.clone(), *value);
            }
            if let Some(value) = def.read_value {
                mock = mock.with_read_value(value);
            }
            Arc::new(mock)
        }
        InstrumentKind::TimeKeeper => Arc::new(TimeKeeper::new()),
        InstrumentKind::RandomGenerator => Arc::new(RandomGenerator::new()),
    }
}

/// Populate a rack with every instrument listed in `settings`.
pub fn build_rack(settings: &Settings) -> InstrumentRack {
    let mut rack = InstrumentRack::new();
    for def in &settings.instruments {
        tracing::debug!(name = %def.name, kind = ?def.kind, "Adding instrument to rack");
        rack.add_shared(def.name.clone(), from_definition(def));
    }
    rack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Rack;

    #[tokio::test]
    async fn test_build_rack_from_settings() {
        let settings = Settings::from_toml_str(
            r#"
            [[instruments]]
            name = "temp_ctrl"
            kind = "mock"
            parameters = { setpoint = 20.0 }
            read_value = 21.5

            [[instruments]]
            name = "noise"
            kind = "random_generator"
            "#,
        )
        .unwrap();

        let rack = build_rack(&settings);
        assert_eq!(rack.names(), vec!["noise".to_string(), "temp_ctrl".to_string()]);

        let temp = rack.get_instrument("temp_ctrl").unwrap();
        assert_eq!(temp.get_parameter("setpoint").await.unwrap(), 20.0);
        assert_eq!(temp.read_value().await.unwrap(), 21.5);
    }
}

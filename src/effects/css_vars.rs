use serde::{Deserialize, Serialize};

/// Custom property names, in the order they are emitted.
pub const CSS_VAR_KEYS: [&str; 8] = [
    "--beat-intensity",
    "--bass-level",
    "--mid-level",
    "--treble-level",
    "--energy-level",
    "--beat-scale",
    "--beat-glow",
    "--tempo-speed",
];

/// Fixed-key string map handed to style-driven effect consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CssVars {
    #[serde(rename = "--beat-intensity")]
    beat_intensity: String,
    #[serde(rename = "--bass-level")]
    bass_level: String,
    #[serde(rename = "--mid-level")]
    mid_level: String,
    #[serde(rename = "--treble-level")]
    treble_level: String,
    #[serde(rename = "--energy-level")]
    energy_level: String,
    #[serde(rename = "--beat-scale")]
    beat_scale: String,
    #[serde(rename = "--beat-glow")]
    beat_glow: String,
    #[serde(rename = "--tempo-speed")]
    tempo_speed: String,
}

impl CssVars {
    #[allow(clippy::too_many_arguments)]
    pub fn from_levels(
        beat_intensity: f32,
        bass: f32,
        mid: f32,
        treble: f32,
        energy: f32,
        beat_scale: f32,
        beat_glow: f32,
        tempo_multiplier: f32,
    ) -> Self {
        let period = if tempo_multiplier > 0.0 {
            1.0 / tempo_multiplier
        } else {
            1.0
        };

        Self {
            beat_intensity: format!("{:.3}", beat_intensity),
            bass_level: format!("{:.3}", bass),
            mid_level: format!("{:.3}", mid),
            treble_level: format!("{:.3}", treble),
            energy_level: format!("{:.3}", energy),
            beat_scale: format!("{:.3}", beat_scale),
            beat_glow: format!("{:.3}", beat_glow),
            tempo_speed: format!("{:.2}s", period),
        }
    }

    fn values(&self) -> [&str; 8] {
        [
            self.beat_intensity.as_str(),
            self.bass_level.as_str(),
            self.mid_level.as_str(),
            self.treble_level.as_str(),
            self.energy_level.as_str(),
            self.beat_scale.as_str(),
            self.beat_glow.as_str(),
            self.tempo_speed.as_str(),
        ]
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        CSS_VAR_KEYS
            .iter()
            .position(|&k| k == key)
            .map(|i| self.values()[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        CSS_VAR_KEYS.into_iter().zip(self.values())
    }
}

impl Default for CssVars {
    /// Resting state: everything at zero, unit scale and tempo.
    fn default() -> Self {
        Self::from_levels(0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_levels_with_three_decimals() {
        let vars = CssVars::from_levels(0.5, 0.12345, 1.0, 0.0, 0.9999, 1.075, 0.35, 1.25);
        assert_eq!(vars.get("--beat-intensity"), Some("0.500"));
        assert_eq!(vars.get("--bass-level"), Some("0.123"));
        assert_eq!(vars.get("--mid-level"), Some("1.000"));
        assert_eq!(vars.get("--treble-level"), Some("0.000"));
        assert_eq!(vars.get("--beat-scale"), Some("1.075"));
        assert_eq!(vars.get("--tempo-speed"), Some("0.80s"));
        assert_eq!(vars.get("--unknown"), None);
    }

    #[test]
    fn resting_vars() {
        let vars = CssVars::default();
        assert_eq!(vars.get("--beat-scale"), Some("1.000"));
        assert_eq!(vars.get("--tempo-speed"), Some("1.00s"));
        assert_eq!(vars.get("--energy-level"), Some("0.000"));
    }

    #[test]
    fn iterates_in_key_order() {
        let keys: Vec<&str> = CssVars::default().iter().map(|(k, _)| k).collect();
        assert_eq!(keys, CSS_VAR_KEYS);
    }

    #[test]
    fn serializes_as_flat_json_object() {
        let vars = CssVars::from_levels(1.0, 0.2, 0.3, 0.4, 0.5, 1.15, 0.7, 2.0);
        let json = serde_json::to_value(&vars).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), 8);
        assert_eq!(object["--beat-glow"], "0.700");
        assert_eq!(object["--tempo-speed"], "0.50s");

        let keys: Vec<&str> = object.keys().map(String::as_str).collect();
        assert_eq!(keys.len(), CSS_VAR_KEYS.len());
        assert!(CSS_VAR_KEYS.iter().all(|k| keys.contains(k)));
    }
}

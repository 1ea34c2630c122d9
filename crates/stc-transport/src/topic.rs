//! Topic naming for telemetry streams.

/// Telemetry topic for a device: `<namespace>/data/<deviceID>`.
///
/// A publisher's own ID names its topic; subscribers subscribe to their
/// peer's topic.
pub fn telemetry_topic(namespace: &str, device_id: &str) -> String {
    format!("{}/data/{}", namespace, device_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_shape() {
        assert_eq!(telemetry_topic("uav", "UAV-Alpha-7"), "uav/data/UAV-Alpha-7");
    }
}

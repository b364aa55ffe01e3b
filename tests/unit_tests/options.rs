use fenris_lor::{LorAssemblyOptions, PlanarJacobianSource};

#[test]
fn options_roundtrip_through_json() {
    let options = LorAssemblyOptions::default()
        .with_parallel(false)
        .with_planar_jacobians(PlanarJacobianSource::Vertices)
        .with_verify_planar_jacobians(Some(1e-9));
    let json = serde_json::to_string(&options).unwrap();
    let deserialized: LorAssemblyOptions = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, options);
}

#[test]
fn missing_option_fields_take_default_values() {
    let options: LorAssemblyOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(options, LorAssemblyOptions::default());

    let options: LorAssemblyOptions = serde_json::from_str(r#"{ "parallel": false }"#).unwrap();
    assert!(!options.parallel);
    assert_eq!(options.planar_jacobians, PlanarJacobianSource::GeometricFactors);
    assert_eq!(options.verify_planar_jacobians, None);
}

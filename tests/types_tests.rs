use index_loader::types::{is_valid_class_name, DistanceMetric, Metric, QueryParameter};
use index_loader::{DatasetVector, IndexParams, LoaderError};

#[test]
fn test_metric_mapping() {
    assert_eq!("euclidean".parse::<Metric>().unwrap().distance(), DistanceMetric::L2Squared);
    assert_eq!("angular".parse::<Metric>().unwrap().distance(), DistanceMetric::Cosine);

    for bad in ["cosine", "l2-squared", "Euclidean", ""] {
        let err = bad.parse::<Metric>().unwrap_err();
        assert!(matches!(err, LoaderError::UnsupportedMetric { .. }), "{bad}: got {err:?}");
    }
}

#[test]
fn test_resolve_fills_distance() {
    let config = IndexParams {
        class_name: "Bench".into(),
        ef_construction: 200,
        max_connections: 32,
        ef: 100,
    }
    .resolve("angular")
    .unwrap();

    assert_eq!(config.class_name(), "Bench");
    assert_eq!(config.distance_metric(), DistanceMetric::Cosine);
    assert_eq!(
        config.vector_index_config(),
        serde_json::json!({
            "distance": "cosine",
            "ef": 100,
            "efConstruction": 200,
            "maxConnections": 32,
        })
    );
}

#[test]
fn test_resolve_rejects_zero_parameters() {
    let params = IndexParams {
        max_connections: 0,
        ..IndexParams::default()
    };
    let err = params.resolve("euclidean").unwrap_err();
    assert!(matches!(err, LoaderError::Config(_)), "got {err:?}");

    let params = IndexParams::default().with_class_name("");
    assert!(params.resolve("euclidean").is_err());
}

#[test]
fn test_distance_metric_wire_names() {
    assert_eq!(serde_json::to_value(DistanceMetric::L2Squared).unwrap(), "l2-squared");
    assert_eq!(DistanceMetric::Cosine.to_string(), "cosine");
}

#[test]
fn test_query_parameter_parse() {
    assert_eq!(QueryParameter::parse("C", "ef").unwrap(), QueryParameter::Ef);
    assert_eq!(
        QueryParameter::parse("C", "flatSearchCutoff").unwrap(),
        QueryParameter::FlatSearchCutoff
    );

    let err = QueryParameter::parse("C", "efConstruction").unwrap_err();
    assert!(err.to_string().contains("fixed at creation time"), "{err}");
    let err = QueryParameter::parse("C", "nprobe").unwrap_err();
    assert!(matches!(err, LoaderError::Schema { .. }));
}

#[test]
fn test_enumerate_numbers_rows_by_position() {
    let vectors = DatasetVector::enumerate(vec![vec![1.0], vec![2.0], vec![3.0]]);
    let ids: Vec<u64> = vectors.iter().map(|v| v.identifier).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(vectors[2].values, vec![3.0]);
}

#[test]
fn test_class_name_must_be_capitalized_identifier() {
    for name in ["Index", "Bench_2", "A"] {
        assert!(is_valid_class_name(name), "{name}");
    }
    for name in ["", "index", "_Index", "My-Index", "Idx Two", "Ïndex"] {
        assert!(!is_valid_class_name(name), "{name}");
    }

    let err = IndexParams::default()
        .with_class_name("index")
        .resolve("euclidean")
        .unwrap_err();
    assert!(matches!(err, LoaderError::Config(_)), "got {err:?}");
}

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static::lazy_static! {
    pub static ref CHUNKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "index_loader_chunks_total", "Chunk write requests", &["class", "status"]
    ).unwrap();
    pub static ref CHUNK_RETRIES_TOTAL: IntCounter = register_int_counter!(
        "index_loader_chunk_retries_total", "Chunk write retries after transport failures"
    ).unwrap();
    pub static ref UPLOADED_ITEMS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "index_loader_uploaded_items_total", "Uploaded objects", &["class", "result"]
    ).unwrap();
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "index_loader_query_duration_seconds", "Near-vector query duration", &["class"],
        vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    ).unwrap();
    pub static ref QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "index_loader_queries_total", "Near-vector queries", &["class", "status"]
    ).unwrap();
}

pub fn init() {
    lazy_static::initialize(&CHUNKS_TOTAL);
    lazy_static::initialize(&CHUNK_RETRIES_TOTAL);
    lazy_static::initialize(&UPLOADED_ITEMS_TOTAL);
    lazy_static::initialize(&QUERY_DURATION);
    lazy_static::initialize(&QUERIES_TOTAL);
}

/// Render the default registry in the Prometheus text format.
pub fn render() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buf) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

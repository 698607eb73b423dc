use datarec_vector_store::{
    shared_embedder, shared_vectorizer, TextEmbedder, TextVectorizer, TfidfVectorizer,
    VectorStoreError, EMBEDDING_DIM,
};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn shared_vectorizer_loads_once_and_pins_its_path() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("tfidf_vectorizer.json");

    let Err(err) = shared_vectorizer(&path) else {
        panic!("missing state must not initialize the singleton");
    };
    assert!(matches!(err, VectorStoreError::NotFitted(_)), "{err}");

    TfidfVectorizer::fitted(&["household energy usage", "energy prices"])
        .expect("fit")
        .save(&path)
        .expect("save");

    let first = shared_vectorizer(&path).expect("load after save");
    let second = shared_vectorizer(&path).expect("cached");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.dimension(), 4);

    let other = temp.path().join("other.json");
    assert!(shared_vectorizer(&other).is_err());
}

#[test]
fn shared_embedder_is_initialized_once_under_concurrent_first_use() {
    let models = TempDir::new().expect("tempdir");
    std::env::set_var("DATAREC_EMBEDDING_MODE", "stub");
    std::env::set_var("DATAREC_MODEL_DIR", models.path());

    let handles: Vec<_> = (0..8)
        .map(|_| std::thread::spawn(|| shared_embedder().expect("stub embedder")))
        .collect();
    let models: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("join"))
        .collect();

    for model in &models[1..] {
        assert!(Arc::ptr_eq(&models[0], model));
    }
    assert_eq!(models[0].dimension(), EMBEDDING_DIM);
    assert_eq!(
        models[0].embed("rainfall").expect("embed").len(),
        EMBEDDING_DIM
    );
}

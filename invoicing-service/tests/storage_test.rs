use invoicing_service::services::{LocalStorage, Storage};

#[tokio::test]
async fn local_storage_round_trips_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(dir.path(), "http://localhost:8080".to_string())
        .await
        .unwrap();

    let url = storage
        .put(
            "invoices/000001.xml",
            b"<cfdi:Comprobante/>".to_vec(),
            "application/xml",
        )
        .await
        .unwrap();
    assert_eq!(
        url,
        "http://localhost:8080/invoices/download?name=invoices/000001.xml"
    );

    let object = storage.get("invoices/000001.xml").await.unwrap();
    assert_eq!(object.bytes, b"<cfdi:Comprobante/>");
    // Local backend keeps no content-type metadata.
    assert!(object.content_type.is_none());
}

#[tokio::test]
async fn missing_artifact_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(dir.path(), "http://localhost:8080".to_string())
        .await
        .unwrap();

    assert!(storage.get("invoices/999999.pdf").await.is_err());
}

#[tokio::test]
async fn traversal_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(dir.path(), "http://localhost:8080".to_string())
        .await
        .unwrap();

    assert!(storage
        .put("../outside.txt", b"x".to_vec(), "text/plain")
        .await
        .is_err());
    assert!(storage.get("invoices/../../etc/passwd").await.is_err());
}

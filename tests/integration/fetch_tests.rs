use super::*;
use dropwatch::site_profile::SiteProfile;
use dropwatch::store::ProductStore;
use dropwatch::App;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_falls_back_to_rendered_when_static_fails() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    harness.static_extractor.push(HEADPHONES_URL, None);
    harness.rendered_extractor.push(HEADPHONES_URL, Some(1099.0));

    let product = harness
        .manager
        .add_product(add_request(HEADPHONES_URL, 999.99))
        .await?;

    assert_eq!(product.current_price, Some(1099.0));
    assert_eq!(harness.static_extractor.call_count(), 1);
    assert_eq!(harness.rendered_extractor.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_attempts_store_nothing() -> anyhow::Result<()> {
    let harness = create_harness_with(test_policy(3)).await?;

    let err = harness
        .manager
        .add_product(add_request(HEADPHONES_URL, 999.99))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AcquisitionFailed { .. }));
    assert_eq!(harness.static_extractor.call_count(), 3);
    assert_eq!(harness.rendered_extractor.call_count(), 3);
    assert!(harness.manager.list_products(true).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_later_attempt_recovers() -> anyhow::Result<()> {
    let harness = create_harness_with(test_policy(3)).await?;
    harness.static_extractor.push(HEADPHONES_URL, None);
    harness.static_extractor.push(HEADPHONES_URL, Some(1049.0));

    let product = harness
        .manager
        .add_product(add_request(HEADPHONES_URL, 999.99))
        .await?;

    assert_eq!(product.current_price, Some(1049.0));
    assert_eq!(harness.static_extractor.call_count(), 2);
    assert_eq!(harness.rendered_extractor.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_rendered_preference_tries_browser_first() -> anyhow::Result<()> {
    let mut policy = test_policy(1);
    policy.preferred = ExtractorKind::Rendered;
    let harness = create_harness_with(policy).await?;
    harness.rendered_extractor.push(HEADPHONES_URL, Some(1099.0));

    harness
        .manager
        .add_product(add_request(HEADPHONES_URL, 999.99))
        .await?;

    assert_eq!(harness.rendered_extractor.call_count(), 1);
    assert_eq!(harness.static_extractor.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_fetch_report_recommends_working_variant() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    harness.static_extractor.push(HEADPHONES_URL, None);
    harness.rendered_extractor.push(HEADPHONES_URL, Some(1099.0));

    let report = harness.manager.test_fetch(HEADPHONES_URL).await?;
    assert_eq!(report.site_id, "amazon");
    assert!(!report.static_fetch.success);
    assert!(report.static_fetch.error.is_some());
    assert!(report.rendered.success);
    assert_eq!(report.recommended, Some(ExtractorKind::Rendered));

    // The browser session does not outlive the test fetch
    assert_eq!(harness.rendered_extractor.releases(), 1);
    Ok(())
}

#[tokio::test]
async fn test_fetch_report_rejects_unsupported_site() -> anyhow::Result<()> {
    let harness = create_harness().await?;
    let err = harness
        .manager
        .test_fetch("https://shop.example.com/item/1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnsupportedSite { .. }));
    assert_eq!(harness.static_extractor.call_count(), 0);
    Ok(())
}

fn store_page(title: &str, price: &str) -> String {
    format!(
        r#"<html><body>
            <h1 class="product-title">{}</h1>
            <div class="price-box"><span class="price">{}</span></div>
        </body></html>"#,
        title, price
    )
}

#[tokio::test]
async fn test_configured_site_end_to_end_over_http() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/kettle"))
        .respond_with(ResponseTemplate::new(200).set_body_string(store_page("Electric Kettle", "₹1,499.00")))
        .mount(&server)
        .await;

    let mut config = get_test_config()?;
    config.sites.push(SiteProfile {
        id: "localshop".to_string(),
        domain_tokens: vec!["127.0.0.1".to_string()],
        title_selectors: vec!["h1.product-title".to_string()],
        price_selectors: vec![".price-box .price".to_string()],
    });

    let store = Arc::new(SqliteStore::in_memory().await?);
    let app = App::with_store(config, store.clone())?;
    let url = format!("{}/p/kettle", server.uri());

    let product = app.manager.add_product(add_request(&url, 1400.0)).await?;
    assert_eq!(product.name, "Electric Kettle");
    assert_eq!(product.site_id, "localshop");
    assert_eq!(product.current_price, Some(1499.0));

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/p/kettle"))
        .respond_with(ResponseTemplate::new(200).set_body_string(store_page("Electric Kettle", "₹1,299.00")))
        .mount(&server)
        .await;

    // SMTP is not configured, so the drop is recorded but stays pending
    let report = app.manager.run_cycle().await?;
    assert_eq!(report.sweep.price_drops, 1);
    assert_eq!(report.notifications_pending, 1);
    assert_eq!(report.marked_delivered, 0);
    assert_eq!(store.pending_drops().await?.len(), 1);

    app.shutdown().await;
    Ok(())
}

mod common;

use catalog_image_kit::error::AppError;
use catalog_image_kit::models::{EntityType, FitMode, OutputFormat};
use catalog_image_kit::services::templates::{TemplateFilter, UpdateTemplate};
use common::{setup, template};
use uuid::Uuid;

#[tokio::test]
async fn create_and_fetch_template() {
    let app = setup().await;

    let created = app
        .add_template("thumb", EntityType::Product, 200, 200, OutputFormat::Webp)
        .await;
    assert!(created.is_active);
    assert_eq!(created.fit_mode, FitMode::Inside);

    let by_id = app.templates.get_by_id(created.id).await.unwrap();
    assert_eq!(by_id, created);

    let by_name = app.templates.get_by_name("thumb").await.unwrap();
    assert_eq!(by_name.map(|t| t.id), Some(created.id));
    assert!(app.templates.get_by_name("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_name_is_a_conflict() {
    let app = setup().await;
    app.add_template("card", EntityType::Product, 400, 300, OutputFormat::Jpeg)
        .await;

    let err = app
        .templates
        .create(template("card", EntityType::Brand, 10, 10, OutputFormat::Png))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn names_keep_their_case() {
    let app = setup().await;
    let upper = app
        .add_template("T", EntityType::Product, 300, 300, OutputFormat::Webp)
        .await;
    assert_eq!(upper.name, "T");

    let lower = app
        .add_template("t", EntityType::Product, 100, 100, OutputFormat::Webp)
        .await;
    assert_ne!(upper.id, lower.id);
    assert_eq!(
        app.templates.get_by_name("T").await.unwrap().map(|t| t.id),
        Some(upper.id)
    );
}

#[tokio::test]
async fn rejects_unsafe_names_and_bad_dimensions() {
    let app = setup().await;

    for name in ["../etc", "originals", "", "has space", "-x"] {
        let err = app
            .templates
            .create(template(name, EntityType::Product, 10, 10, OutputFormat::Png))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{name:?} accepted");
    }

    let err = app
        .templates
        .create(template("zero", EntityType::Product, 0, 10, OutputFormat::Png))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn list_filters_and_paginates() {
    let app = setup().await;
    app.add_template("thumb", EntityType::Product, 100, 100, OutputFormat::Webp)
        .await;
    app.add_template("large", EntityType::Product, 1200, 1200, OutputFormat::Jpeg)
        .await;
    app.add_template("logo", EntityType::Brand, 300, 100, OutputFormat::Png)
        .await;

    let (all, total) = app.templates.list(&TemplateFilter::default()).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(all.len(), 3);

    let products = TemplateFilter {
        entity_type: Some(EntityType::Product),
        ..Default::default()
    };
    let (items, total) = app.templates.list(&products).await.unwrap();
    assert_eq!(total, 2);
    assert!(items.iter().all(|t| t.entity_type == EntityType::Product));

    let search = TemplateFilter {
        search: Some("LOG".to_string()),
        ..Default::default()
    };
    let (items, _) = app.templates.list(&search).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "logo");

    let second_page = TemplateFilter {
        page: Some(2),
        limit: Some(2),
        ..Default::default()
    };
    let (items, total) = app.templates.list(&second_page).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn update_changes_fields_and_guards_names() {
    let app = setup().await;
    let thumb = app
        .add_template("thumb", EntityType::Product, 100, 100, OutputFormat::Webp)
        .await;
    app.add_template("large", EntityType::Product, 1200, 1200, OutputFormat::Jpeg)
        .await;

    let updated = app
        .templates
        .update(
            thumb.id,
            UpdateTemplate {
                width: Some(150),
                fit_mode: Some(FitMode::Cover),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.width, 150);
    assert_eq!(updated.height, 100);
    assert_eq!(updated.fit_mode, FitMode::Cover);
    assert!(updated.updated_at >= thumb.updated_at);

    let taken = app
        .templates
        .update(
            thumb.id,
            UpdateTemplate {
                name: Some("large".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(taken, AppError::Conflict(_)));

    let unsafe_name = app
        .templates
        .update(
            thumb.id,
            UpdateTemplate {
                name: Some("../x".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(unsafe_name, AppError::BadRequest(_)));

    let missing = app
        .templates
        .update(Uuid::new_v4(), UpdateTemplate::default())
        .await
        .unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));
}

#[tokio::test]
async fn toggle_and_active_listing() {
    let app = setup().await;
    let a = app
        .add_template("a-small", EntityType::Category, 100, 100, OutputFormat::Webp)
        .await;
    let mut b = template("b-banner", EntityType::Category, 1600, 400, OutputFormat::Jpeg);
    b.sort_order = -1;
    let b = app.templates.create(b).await.unwrap();

    let active = app
        .templates
        .active_by_entity_type(EntityType::Category)
        .await
        .unwrap();
    assert_eq!(
        active.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![b.id, a.id]
    );

    let toggled = app.templates.toggle_active(a.id).await.unwrap();
    assert!(!toggled.is_active);
    let active = app
        .templates
        .active_by_entity_type(EntityType::Category)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);

    let back = app.templates.toggle_active(a.id).await.unwrap();
    assert!(back.is_active);
}

#[tokio::test]
async fn delete_template() {
    let app = setup().await;
    let t = app
        .add_template("hero", EntityType::BlogPost, 1920, 1080, OutputFormat::Jpeg)
        .await;

    app.templates.delete(t.id).await.unwrap();
    assert!(matches!(
        app.templates.get_by_id(t.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        app.templates.delete(t.id).await,
        Err(AppError::NotFound(_))
    ));
}

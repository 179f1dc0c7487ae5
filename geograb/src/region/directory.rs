//! One-level crawl of a service directory.

use serde::Serialize;
use tracing::{debug, trace};

use super::registry::ServiceKind;
use crate::rest::{RestClient, RestError};
use crate::transport::AsyncHttpClient;

/// A browsable child of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildService {
    /// Name as listed, possibly with a folder prefix (`Utilities/Water`)
    pub name: String,
    /// Last path segment of the name
    pub display_name: String,
    pub url: String,
    pub kind: ServiceKind,
}

/// Lists the browsable children of `directory_url`, sorted by display name.
///
/// Map and feature services become `{dir}/{name}/{type}`; folders become
/// nested directories at `{dir}/{folder}`. Every other kind is dropped.
pub async fn list_directory_children<C: AsyncHttpClient>(
    client: &RestClient<C>,
    directory_url: &str,
) -> Result<Vec<ChildService>, RestError> {
    let base = directory_url.trim_end_matches('/');
    let listing = client.directory_listing(base).await?;

    let mut children = Vec::with_capacity(listing.folders.len() + listing.services.len());
    for folder in &listing.folders {
        let relative = relative_name(base, folder);
        if relative.is_empty() {
            continue;
        }
        children.push(ChildService {
            name: folder.clone(),
            display_name: display_name(folder),
            url: format!("{}/{}", base, relative),
            kind: ServiceKind::Directory,
        });
    }

    let mut skipped = 0usize;
    for entry in &listing.services {
        let kind = ServiceKind::from_type_name(&entry.service_type);
        if !kind.is_layer_service() {
            trace!(name = %entry.name, kind = %kind, "Skipping non-browsable service");
            skipped += 1;
            continue;
        }
        children.push(ChildService {
            name: entry.name.clone(),
            display_name: display_name(&entry.name),
            url: format!("{}/{}/{}", base, relative_name(base, &entry.name), kind),
            kind,
        });
    }

    children.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.url.cmp(&b.url))
    });
    debug!(
        directory = %base,
        children = children.len(),
        skipped,
        "Directory listed"
    );
    Ok(children)
}

fn display_name(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

/// Listings inside a folder name services with the folder prefix
/// (`Utilities/Water` under `.../services/Utilities`); that prefix is
/// already part of the base URL.
fn relative_name<'n>(base: &str, name: &'n str) -> &'n str {
    let name = name.trim_matches('/');
    match base.rsplit('/').next() {
        Some(folder) if !folder.is_empty() => name
            .strip_prefix(folder)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(name),
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockAsyncHttpClient;
    use serde_json::json;

    const ROOT: &str = "https://gis.example.com/arcgis/rest/services";

    #[tokio::test]
    async fn test_only_browsable_children_sorted() {
        let http = MockAsyncHttpClient::new().route_json(
            ROOT,
            json!({
                "folders": [],
                "services": [
                    {"name": "zoning", "type": "MapServer"},
                    {"name": "Parcels", "type": "FeatureServer"},
                    {"name": "Imagery", "type": "ImageServer"},
                    {"name": "Roads", "type": "MapServer"},
                    {"name": "Geocoder", "type": "GeocodeServer"},
                    {"name": "Addresses", "type": "MapServer"}
                ]
            }),
        );
        let client = RestClient::new(http);
        let children = list_directory_children(&client, ROOT).await.unwrap();
        let names: Vec<&str> = children.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["Addresses", "Parcels", "Roads", "zoning"]);
        assert_eq!(children[1].url, format!("{}/Parcels/FeatureServer", ROOT));
        assert_eq!(children[1].kind, ServiceKind::FeatureServer);
    }

    #[tokio::test]
    async fn test_folders_become_directories() {
        let http = MockAsyncHttpClient::new().route_json(
            ROOT,
            json!({
                "folders": ["Utilities"],
                "services": [{"name": "Basemap", "type": "MapServer"}]
            }),
        );
        let client = RestClient::new(http);
        let children = list_directory_children(&client, &format!("{}/", ROOT))
            .await
            .unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].display_name, "Utilities");
        assert_eq!(children[1].kind, ServiceKind::Directory);
        assert_eq!(children[1].url, format!("{}/Utilities", ROOT));
    }

    #[tokio::test]
    async fn test_folder_prefix_not_duplicated() {
        let folder = format!("{}/Utilities", ROOT);
        let http = MockAsyncHttpClient::new().route_json(
            &folder,
            json!({"services": [{"name": "Utilities/Water", "type": "MapServer"}]}),
        );
        let client = RestClient::new(http);
        let children = list_directory_children(&client, &folder).await.unwrap();
        assert_eq!(children[0].display_name, "Water");
        assert_eq!(children[0].name, "Utilities/Water");
        assert_eq!(children[0].url, format!("{}/Water/MapServer", folder));
    }

    #[tokio::test]
    async fn test_listing_error_propagates() {
        let http = MockAsyncHttpClient::new().route_json(
            ROOT,
            json!({"error": {"code": 403, "message": "Token required"}}),
        );
        let client = RestClient::new(http);
        let result = list_directory_children(&client, ROOT).await;
        assert!(matches!(result, Err(RestError::RemoteService { code: 403, .. })));
    }

    #[test]
    fn test_relative_name() {
        assert_eq!(relative_name(ROOT, "Roads"), "Roads");
        assert_eq!(relative_name(&format!("{}/Utilities", ROOT), "Utilities/Water"), "Water");
        assert_eq!(relative_name(ROOT, "Utilities/Water"), "Utilities/Water");
    }
}

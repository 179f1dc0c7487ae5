//! Resolution of known layers to concrete layer ids.

use tracing::debug;

use super::registry::{LayerMatch, LayerTarget};
use crate::rest::{LayerSummary, RestClient, RestError};
use crate::transport::AsyncHttpClient;

/// First feature layer whose name contains `hint`, ignoring case.
pub fn match_layer_hint<'l>(layers: &'l [LayerSummary], hint: &str) -> Option<&'l LayerSummary> {
    let hint = hint.to_lowercase();
    layers
        .iter()
        .filter(|l| l.is_feature_layer())
        .find(|l| l.name.to_lowercase().contains(&hint))
}

/// Concrete layer id for a registry match.
///
/// A name hint costs one service listing request; `Ok(None)` means no layer
/// on the service matches it.
pub async fn resolve_layer_id<C: AsyncHttpClient>(
    client: &RestClient<C>,
    found: &LayerMatch,
) -> Result<Option<i64>, RestError> {
    match &found.target {
        LayerTarget::Id(id) => Ok(Some(*id)),
        LayerTarget::Hint(hint) => {
            let layers = client.service_layers(&found.service_url).await?;
            let id = match_layer_hint(&layers, hint).map(|l| l.id);
            debug!(
                key = %found.key,
                hint = %hint,
                layer_id = ?id,
                "Resolved layer hint"
            );
            Ok(id)
        }
    }
}

//! FolderTree validating admission webhook
//!
//! Handles AdmissionReview requests for FolderTrees and denies writes whose
//! RoleBinding consequences the requester could not perform themselves.

use std::sync::Arc;

use axum::{extract::State, Json};
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
};
use tracing::{debug, error, info, instrument, warn};

use super::access::{AccessValidator, Requester};
use super::WebhookState;
use crate::crd::FolderTree;
use crate::Error;

/// Handle validating admission review for FolderTrees
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = review(&state.validator, &req).await;
    Json(response.into_review())
}

/// Decide a single admission request
///
/// Status writes and requests without a username are allowed. Everything
/// else is allowed only if the [`AccessValidator`] agrees.
#[instrument(
    skip_all,
    fields(uid = %request.uid, operation = ?request.operation, tree = %request.name)
)]
pub async fn review(
    validator: &AccessValidator,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let response = AdmissionResponse::from(request);

    if request.sub_resource.as_deref() == Some("status") {
        debug!("status subresource write, allowing");
        return response;
    }

    let Some(requester) = Requester::from_user_info(&request.user_info) else {
        warn!("admission request carries no username, allowing");
        return response;
    };

    match admit(validator, &requester, request).await {
        Ok(()) => {
            info!(user = %requester.username, "allowed FolderTree request");
            response
        }
        Err(e) => {
            warn!(user = %requester.username, error = %e, "denied FolderTree request");
            response.deny(e.to_string())
        }
    }
}

async fn admit(
    validator: &AccessValidator,
    requester: &Requester,
    request: &AdmissionRequest<DynamicObject>,
) -> Result<(), Error> {
    match request.operation {
        Operation::Create => {
            let new = parse(request.object.as_ref(), "object")?;
            validator.validate_write(requester, None, &new).await
        }
        Operation::Update => {
            let old = parse(request.old_object.as_ref(), "oldObject")?;
            let new = parse(request.object.as_ref(), "object")?;
            validator.validate_write(requester, Some(&old), &new).await
        }
        Operation::Delete => {
            let tree = parse(request.old_object.as_ref(), "oldObject")?;
            validator.validate_delete(requester, &tree).await
        }
        Operation::Connect => Ok(()),
    }
}

fn parse(object: Option<&DynamicObject>, field: &str) -> Result<FolderTree, Error> {
    let object = object
        .ok_or_else(|| Error::validation(format!("admission request is missing {field}")))?;
    object
        .clone()
        .try_parse::<FolderTree>()
        .map_err(|e| Error::serialization_for_kind("FolderTree", e.to_string()))
}

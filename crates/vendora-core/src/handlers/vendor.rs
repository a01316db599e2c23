// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Vendor handlers.
//!
//! The vendor code doubles as the aggregate cache key, so every operation
//! that changes or removes a code also drops the affected cache entries.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{HandlerState, Page};
use crate::error::{CoreError, Result};
use crate::model::{self, NewVendor, VendorUpdate};
use crate::persistence::{PerformanceRecord, VendorRecord};

/// Request to register a vendor.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVendorRequest {
    /// Display name.
    pub name: String,
    /// Free-form contact details.
    #[serde(default)]
    pub contact_details: Option<String>,
    /// Postal address.
    #[serde(default)]
    pub address: Option<String>,
    /// Unique vendor code.
    pub vendor_code: String,
}

/// Partial vendor update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateVendorRequest {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New contact details.
    #[serde(default)]
    pub contact_details: Option<String>,
    /// New address.
    #[serde(default)]
    pub address: Option<String>,
    /// New vendor code; must stay unique.
    #[serde(default)]
    pub vendor_code: Option<String>,
}

/// One page of vendors.
#[derive(Debug, Clone, Serialize)]
pub struct ListVendorsResponse {
    /// Vendors on this page, oldest first.
    pub vendors: Vec<VendorRecord>,
    /// Total number of vendors.
    pub total_count: i64,
    /// Applied page size.
    pub limit: i64,
    /// Applied offset.
    pub offset: i64,
}

/// Handle vendor registration.
///
/// Creates the vendor together with an empty performance record.
///
/// # Errors
///
/// - `VALIDATION_ERROR` for an empty or oversized name or code, or a code
///   using the reserved prefix
/// - `VENDOR_CODE_TAKEN` when another vendor uses the code
#[instrument(skip(state, request), fields(vendor_code = %request.vendor_code))]
pub async fn handle_create_vendor(
    state: &HandlerState,
    request: CreateVendorRequest,
) -> Result<VendorRecord> {
    model::validate_vendor_name(&request.name)?;
    model::validate_vendor_code(&request.vendor_code)?;

    if state
        .persistence
        .get_vendor_by_code(&request.vendor_code)
        .await?
        .is_some()
    {
        return Err(CoreError::VendorCodeTaken {
            vendor_code: request.vendor_code,
        });
    }

    let vendor = state
        .persistence
        .create_vendor(&NewVendor {
            vendor_id: Uuid::new_v4().to_string(),
            name: request.name,
            contact_details: request.contact_details,
            address: request.address,
            vendor_code: request.vendor_code,
            created_at: state.clock.now(),
        })
        .await?;

    // A vendor deleted earlier may have left an entry under the same code.
    state.engine.invalidate_vendor(&vendor.vendor_code).await;

    info!(vendor_id = %vendor.vendor_id, "Vendor created");
    Ok(vendor)
}

/// Handle vendor lookup.
#[instrument(skip(state))]
pub async fn handle_get_vendor(state: &HandlerState, vendor_id: &str) -> Result<VendorRecord> {
    state
        .persistence
        .get_vendor(vendor_id)
        .await?
        .ok_or_else(|| CoreError::VendorNotFound {
            vendor_id: vendor_id.to_string(),
        })
}

/// Handle vendor listing.
#[instrument(skip(state))]
pub async fn handle_list_vendors(state: &HandlerState, page: Page) -> Result<ListVendorsResponse> {
    let (limit, offset) = page.resolve()?;

    let vendors = state.persistence.list_vendors(limit, offset).await?;
    let total_count = state.persistence.count_vendors().await?;

    Ok(ListVendorsResponse {
        vendors,
        total_count,
        limit,
        offset,
    })
}

/// Handle a partial vendor update.
///
/// Changing the vendor code drops the cache entries under both the old and
/// the new code; the next order write rebuilds the entry from the tables.
#[instrument(skip(state, request))]
pub async fn handle_update_vendor(
    state: &HandlerState,
    vendor_id: &str,
    request: UpdateVendorRequest,
) -> Result<VendorRecord> {
    if let Some(name) = &request.name {
        model::validate_vendor_name(name)?;
    }
    if let Some(code) = &request.vendor_code {
        model::validate_vendor_code(code)?;
    }

    let existing = handle_get_vendor(state, vendor_id).await?;

    if let Some(code) = &request.vendor_code
        && *code != existing.vendor_code
        && state.persistence.get_vendor_by_code(code).await?.is_some()
    {
        return Err(CoreError::VendorCodeTaken {
            vendor_code: code.clone(),
        });
    }

    let update = VendorUpdate {
        name: request.name,
        contact_details: request.contact_details,
        address: request.address,
        vendor_code: request.vendor_code,
    };

    let updated = state
        .persistence
        .update_vendor(vendor_id, &update)
        .await?
        .ok_or_else(|| CoreError::VendorNotFound {
            vendor_id: vendor_id.to_string(),
        })?;

    if updated.vendor_code != existing.vendor_code {
        info!(
            old_code = %existing.vendor_code,
            new_code = %updated.vendor_code,
            "Vendor code changed"
        );
        state.engine.invalidate_vendor(&existing.vendor_code).await;
        state.engine.invalidate_vendor(&updated.vendor_code).await;
    }

    Ok(updated)
}

/// Handle vendor deletion.
///
/// Purchase orders and the performance record are removed with the vendor.
#[instrument(skip(state))]
pub async fn handle_delete_vendor(state: &HandlerState, vendor_id: &str) -> Result<()> {
    let vendor = handle_get_vendor(state, vendor_id).await?;

    if !state.persistence.delete_vendor(vendor_id).await? {
        return Err(CoreError::VendorNotFound {
            vendor_id: vendor_id.to_string(),
        });
    }

    state.engine.invalidate_vendor(&vendor.vendor_code).await;

    info!(vendor_code = %vendor.vendor_code, "Vendor deleted");
    Ok(())
}

/// Handle performance lookup for a vendor.
#[instrument(skip(state))]
pub async fn handle_get_vendor_performance(
    state: &HandlerState,
    vendor_id: &str,
) -> Result<PerformanceRecord> {
    state
        .persistence
        .get_performance(vendor_id)
        .await?
        .ok_or_else(|| CoreError::VendorNotFound {
            vendor_id: vendor_id.to_string(),
        })
}

//! # Entity Schemas
//!
//! Declarative field mapping per entity class. The Entity Mapper and the
//! Diff Engine are generic; this table is the only per-entity code.
//!
//! ## Inventory Item Mapping
//! ```text
//! ┌──────────────────────┬────────────────────┬──────────┐
//! │ local (components)   │ remote (ERP item)  │ kind     │
//! ├──────────────────────┼────────────────────┼──────────┤
//! │ item_code   (key)    │ ItemCode           │ text     │
//! │ name                 │ Description        │ text *   │
//! │ description          │ FurtherDescription │ text     │
//! │ category             │ ItemGroup          │ text     │
//! │ unit                 │ BaseUOM            │ text     │
//! │ cost_cents           │ StandardCost       │ money    │
//! │ price_cents          │ Price              │ money    │
//! │ barcode              │ Barcode            │ text     │
//! │ is_active            │ IsActive           │ flag     │
//! └──────────────────────┴────────────────────┴──────────┘
//!   * required
//! ```
//!
//! Columns not listed (current_stock, reorder_level, location, sync
//! bookkeeping) are local-only and are never written by a sync.

use crate::types::EntityKind;

// =============================================================================
// Field Declarations
// =============================================================================

/// How a field is typed and normalized before comparison.
///
/// ## Canonical Normalization
/// ```text
/// Text     trimmed; "" ≡ null ≡ absent
/// Integer  null ≡ absent ≡ 0
/// Money    null ≡ absent ≡ 0.00
/// Flag     null ≡ absent ≡ declared default
/// Date     YYYY-MM-DD (time part dropped); "" ≡ null ≡ absent
/// Lines    each line normalized, order kept; [] ≡ null ≡ absent
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Money,
    Flag { absent: bool },
    Date,
    Lines,
}

/// One syncable field: its local column, its remote property and its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub local: &'static str,
    pub remote: &'static str,
    pub kind: FieldKind,
    /// Remote records without a value here cannot be mapped.
    pub required: bool,
}

impl FieldSpec {
    const fn new(local: &'static str, remote: &'static str, kind: FieldKind) -> Self {
        FieldSpec {
            local,
            remote,
            kind,
            required: false,
        }
    }

    const fn required(self) -> Self {
        FieldSpec {
            required: true,
            ..self
        }
    }
}

/// The natural key on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub local: &'static str,
    pub remote: &'static str,
}

/// Remote property names inside a document line.
pub mod line_fields {
    pub const ITEM_CODE: &str = "ItemCode";
    pub const DESCRIPTION: &str = "Description";
    pub const QUANTITY: &str = "Qty";
    pub const UNIT_PRICE: &str = "UnitPrice";
}

/// Full mapping declaration for one entity class.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub key: KeySpec,
    /// Syncable fields. Only these are diffed and written.
    pub fields: &'static [FieldSpec],
}

impl EntitySchema {
    /// Looks up a field by local column name.
    pub fn field(&self, local: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.local == local)
    }

    /// Local column names of the syncable fields, in declaration order.
    pub fn local_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.local)
    }
}

// =============================================================================
// Declarations per Entity Class
// =============================================================================

pub static INVENTORY_ITEM: EntitySchema = EntitySchema {
    kind: EntityKind::InventoryItem,
    key: KeySpec {
        local: "item_code",
        remote: "ItemCode",
    },
    fields: &[
        FieldSpec::new("name", "Description", FieldKind::Text).required(),
        FieldSpec::new("description", "FurtherDescription", FieldKind::Text),
        FieldSpec::new("category", "ItemGroup", FieldKind::Text),
        FieldSpec::new("unit", "BaseUOM", FieldKind::Text),
        FieldSpec::new("cost_cents", "StandardCost", FieldKind::Money),
        FieldSpec::new("price_cents", "Price", FieldKind::Money),
        FieldSpec::new("barcode", "Barcode", FieldKind::Text),
        FieldSpec::new("is_active", "IsActive", FieldKind::Flag { absent: true }),
    ],
};

pub static SUPPLIER: EntitySchema = EntitySchema {
    kind: EntityKind::Supplier,
    key: KeySpec {
        local: "code",
        remote: "AccNo",
    },
    fields: &[
        FieldSpec::new("name", "CompanyName", FieldKind::Text).required(),
        FieldSpec::new("contact_person", "Attention", FieldKind::Text),
        FieldSpec::new("phone", "Phone1", FieldKind::Text),
        FieldSpec::new("email", "EmailAddress", FieldKind::Text),
        FieldSpec::new("address", "Address1", FieldKind::Text),
        FieldSpec::new("currency_code", "CurrencyCode", FieldKind::Text),
        FieldSpec::new("credit_term", "DisplayTerm", FieldKind::Text),
        FieldSpec::new("is_active", "IsActive", FieldKind::Flag { absent: true }),
    ],
};

pub static PURCHASE_ORDER: EntitySchema = EntitySchema {
    kind: EntityKind::PurchaseOrder,
    key: KeySpec {
        local: "po_number",
        remote: "DocNo",
    },
    fields: &[
        FieldSpec::new("supplier_code", "CreditorCode", FieldKind::Text).required(),
        FieldSpec::new("order_date", "DocDate", FieldKind::Date).required(),
        FieldSpec::new("description", "Description", FieldKind::Text),
        FieldSpec::new("currency_code", "CurrencyCode", FieldKind::Text),
        FieldSpec::new("total_cents", "Total", FieldKind::Money),
        FieldSpec::new("lines", "Details", FieldKind::Lines),
    ],
};

/// Returns the schema for an entity class.
pub fn schema_for(kind: EntityKind) -> &'static EntitySchema {
    match kind {
        EntityKind::InventoryItem => &INVENTORY_ITEM,
        EntityKind::Supplier => &SUPPLIER,
        EntityKind::PurchaseOrder => &PURCHASE_ORDER,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

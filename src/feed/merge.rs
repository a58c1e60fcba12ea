//! Reconciliation of crawled records with price-list records
//!
//! A price-list record with the same mpn fills the crawled record: every
//! non-empty field of the price-list record is copied over, except that the
//! name and long description only replace the `Dummy` placeholder, the
//! minimum amount only replaces the default of 1 and `forsale` only replaces
//! `Y`.

use crate::feed::item::{ProductRecord, DEFAULT_PRODUCT_NAME};
use indexmap::IndexMap;
use std::path::Path;

/// Emptiness as the feed importer understands it: empty or `"0"` strings,
/// zero numbers, `false`, empty collections and missing values
pub trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.is_empty() || self == "0"
    }
}

impl Blank for f64 {
    fn is_blank(&self) -> bool {
        *self == 0.0
    }
}

impl Blank for u32 {
    fn is_blank(&self) -> bool {
        *self == 0
    }
}

impl Blank for i64 {
    fn is_blank(&self) -> bool {
        *self == 0
    }
}

impl Blank for bool {
    fn is_blank(&self) -> bool {
        !*self
    }
}

impl<T> Blank for Vec<T> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Blank for IndexMap<K, V> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Blank> Blank for Option<T> {
    fn is_blank(&self) -> bool {
        self.as_ref().map_or(true, Blank::is_blank)
    }
}

/// Reads price-list records from a JSON array file
///
/// # Returns
///
/// * `Ok(Vec<ProductRecord>)` - The records in file order
/// * `Err(FeedError)` - The file could not be read or is not a record array
pub fn load_price_list(path: &Path) -> crate::Result<Vec<ProductRecord>> {
    let content = std::fs::read_to_string(path)?;
    let records: Vec<ProductRecord> = serde_json::from_str(&content)?;
    tracing::debug!("{} price-list records read from {}", records.len(), path.display());
    Ok(records)
}

macro_rules! copy_filled {
    ($target:expr, $source:expr, $($field:ident),+ $(,)?) => {
        $(
            if !$source.$field.is_blank() {
                $target.$field = $source.$field.clone();
            }
        )+
    };
}

/// Fills `targets` from `sources` keyed by mpn
///
/// Group children are merged before their group. `after_merge` runs for every
/// target, matched or not. The content hash of a filled record, and of every
/// group, is recomputed.
pub fn merge<F>(targets: &mut [ProductRecord], sources: &IndexMap<String, ProductRecord>, after_merge: &mut F)
where
    F: FnMut(&mut ProductRecord),
{
    for target in targets.iter_mut() {
        if target.is_group {
            merge(&mut target.child_products, sources, after_merge);
            target.refresh_hash();
        }

        if let Some(source) = sources.get(&target.mpn) {
            merge_record(target, source);
        }

        after_merge(target);
    }
}

/// Copies the non-empty fields of one price-list record into `target`
pub fn merge_record(target: &mut ProductRecord, source: &ProductRecord) {
    copy_filled!(
        target,
        source,
        productcode,
        asin,
        cost_to_us,
        list_price,
        descr,
        brand_name,
        brand_normalized,
        eta_date_mm_dd_yyyy,
        upc,
        supplier_categories,
        supplier_internal_id,
        images,
        alt_names,
        dim_x,
        dim_y,
        dim_z,
        shipping_weight,
        shipping_dim_x,
        shipping_dim_y,
        shipping_dim_z,
        weight,
        mult_order_quantity,
        is_group,
        child_products,
        group_mask,
        new_map_price,
        r_avail,
        mpn,
        lead_time_message,
        attributes,
        product_files,
        options,
        videos,
    );

    if target.product == DEFAULT_PRODUCT_NAME {
        copy_filled!(target, source, product);
    }
    if target.fulldescr == DEFAULT_PRODUCT_NAME {
        copy_filled!(target, source, fulldescr);
    }
    if target.min_amount == 1 {
        copy_filled!(target, source, min_amount);
    }
    if target.forsale == "Y" {
        copy_filled!(target, source, forsale);
    }

    target.refresh_hash();
}

//! Lookup of places by internal place id or OSM id.

use std::sync::Arc;

use mercator_data::{Bbox, InterpolationRow, OsmType, PlaceRow, PostcodeRow};
use tracing::{debug, instrument};

use crate::{
    connection::{LineFilter, PlaceCondition, PlaceFilter, PostcodeFilter, Result, SearchConnection},
    results::{BaseResult, DetailedResult, SearchResult, add_result_details},
    trace::SearchTrace,
    types::{LookupDetails, PlaceRef},
};

/// A place found in one of the data tables.
#[derive(Debug, Clone)]
enum Found {
    Place(Arc<PlaceRow>),
    Interpolation(Arc<InterpolationRow>),
    Postcode(Arc<PostcodeRow>),
    Tiger {
        row: Arc<InterpolationRow>,
        street_osm: Option<(OsmType, i64)>,
    },
}

impl Found {
    fn into_base(self) -> (BaseResult, Option<Bbox>) {
        match self {
            Self::Place(row) => (BaseResult::from_place(&row), Some(row.geometry.bbox())),
            Self::Interpolation(row) => (
                BaseResult::from_interpolation(&row, None, row.linegeo.centroid()),
                Some(row.linegeo.bbox()),
            ),
            Self::Postcode(row) => (BaseResult::from_postcode(&row), Some(row.geometry.bbox())),
            Self::Tiger { row, street_osm } => (
                BaseResult::from_tiger(&row, None, row.linegeo.centroid(), street_osm),
                Some(row.linegeo.bbox()),
            ),
        }
    }
}

async fn find_in_places<C>(conn: &C, place: &PlaceRef) -> Result<Option<Arc<PlaceRow>>>
where
    C: SearchConnection + ?Sized,
{
    match place {
        PlaceRef::PlaceId(place_id) => Ok(conn
            .places(&PlaceFilter::new().with(PlaceCondition::Ids(vec![*place_id])))
            .await?
            .into_iter()
            .next()),
        PlaceRef::Osm {
            osm_type,
            osm_id,
            class,
        } => {
            let filter = PlaceFilter::new()
                .with(PlaceCondition::Osm {
                    osm_type: *osm_type,
                    osm_id: *osm_id,
                })
                .with_if(class.is_some(), || {
                    PlaceCondition::ClassIn(class.iter().cloned().collect())
                });
            // Several objects may share an OSM id, take the first class.
            Ok(conn
                .places(&filter)
                .await?
                .into_iter()
                .min_by(|a, b| a.category.class.cmp(&b.category.class)))
        }
    }
}

async fn find_in_interpolations<C>(conn: &C, place: &PlaceRef) -> Result<Option<Arc<InterpolationRow>>>
where
    C: SearchConnection + ?Sized,
{
    let filter = match place {
        PlaceRef::PlaceId(place_id) => LineFilter {
            ids: vec![*place_id],
            ..LineFilter::default()
        },
        PlaceRef::Osm {
            osm_type: OsmType::Way,
            osm_id,
            ..
        } => LineFilter {
            osm_ids: vec![*osm_id],
            ..LineFilter::default()
        },
        PlaceRef::Osm { .. } => return Ok(None),
    };
    let rows = conn.interpolations(&filter).await?;
    // A way may carry several interpolations, pick the one closest to the wanted number.
    Ok(match place.class_as_housenumber() {
        Some(number) => rows.into_iter().min_by_key(|row| {
            number
                .saturating_sub(row.endnumber)
                .max(row.startnumber.saturating_sub(number))
        }),
        None => rows.into_iter().next(),
    })
}

async fn find_in_postcodes<C>(conn: &C, place: &PlaceRef) -> Result<Option<Arc<PostcodeRow>>>
where
    C: SearchConnection + ?Sized,
{
    let PlaceRef::PlaceId(place_id) = place else {
        return Ok(None);
    };
    let filter = PostcodeFilter {
        ids: vec![*place_id],
        limit: Some(1),
        ..PostcodeFilter::default()
    };
    Ok(conn.postcodes(&filter).await?.into_iter().next())
}

async fn find_in_tiger<C>(conn: &C, place: &PlaceRef) -> Result<Option<Found>>
where
    C: SearchConnection + ?Sized,
{
    let PlaceRef::PlaceId(place_id) = place else {
        return Ok(None);
    };
    let filter = LineFilter {
        ids: vec![*place_id],
        limit: Some(1),
        ..LineFilter::default()
    };
    let Some(row) = conn.tiger(&filter).await?.into_iter().next() else {
        return Ok(None);
    };
    let street_osm = match row.parent_place_id {
        Some(parent) => conn
            .places(&PlaceFilter::new().with(PlaceCondition::Ids(vec![parent])))
            .await?
            .first()
            .map(|street| (street.osm_type, street.osm_id)),
        None => None,
    };
    Ok(Some(Found::Tiger { row, street_osm }))
}

/// Search the place table, then interpolations, postcodes and TIGER lines.
async fn find_in_all_tables<C>(conn: &C, place: &PlaceRef, trace: &dyn SearchTrace) -> Result<Option<Found>>
where
    C: SearchConnection + ?Sized,
{
    trace.section("Find in place table");
    if let Some(row) = find_in_places(conn, place).await? {
        return Ok(Some(Found::Place(row)));
    }
    trace.section("Find in interpolation table");
    if let Some(row) = find_in_interpolations(conn, place).await? {
        return Ok(Some(Found::Interpolation(row)));
    }
    trace.section("Find in postcode table");
    if let Some(row) = find_in_postcodes(conn, place).await? {
        return Ok(Some(Found::Postcode(row)));
    }
    trace.section("Find in TIGER table");
    find_in_tiger(conn, place).await
}

/// Place with all requested details, for the details endpoint.
#[instrument(name = "Detailed place lookup", level = "info", skip_all, fields(place = ?place))]
pub async fn get_detailed_place<C>(
    conn: &C,
    place: &PlaceRef,
    details: &LookupDetails,
    trace: &dyn SearchTrace,
) -> Result<Option<DetailedResult>>
where
    C: SearchConnection + ?Sized,
{
    let Some(found) = find_in_all_tables(conn, place, trace).await? else {
        debug!("Place not found");
        return Ok(None);
    };
    let (base, bbox) = found.into_base();
    let mut results = [DetailedResult { base, bbox }];
    add_result_details(conn, &mut results, details, trace).await?;
    let [result] = results;
    Ok(Some(result))
}

/// Place as a plain search result.
pub async fn get_simple_place<C>(
    conn: &C,
    place: &PlaceRef,
    details: &LookupDetails,
    trace: &dyn SearchTrace,
) -> Result<Option<SearchResult>>
where
    C: SearchConnection + ?Sized,
{
    let Some(found) = find_in_all_tables(conn, place, trace).await? else {
        return Ok(None);
    };
    let (base, bbox) = found.into_base();
    let mut results = [SearchResult {
        bbox,
        ..SearchResult::new(base, 0.0)
    }];
    add_result_details(conn, &mut results, details, trace).await?;
    let [result] = results;
    Ok(Some(result))
}

/// All places that could be found, in request order. Missing ones are skipped.
#[instrument(name = "Place lookup", level = "info", skip_all, fields(places = places.len()))]
pub async fn get_places<C>(
    conn: &C,
    places: &[PlaceRef],
    details: &LookupDetails,
    trace: &dyn SearchTrace,
) -> Result<Vec<SearchResult>>
where
    C: SearchConnection + ?Sized,
{
    let mut results = Vec::with_capacity(places.len());
    for place in places {
        if let Some(result) = get_simple_place(conn, place, details, trace).await? {
            results.push(result);
        }
    }
    debug!(found = results.len(), "Places looked up");
    Ok(results)
}

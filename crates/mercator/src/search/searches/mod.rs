//! Executable searches.
//!
//! Every [`AbstractSearch`] describes one way of looking up the query in the database
//! together with the penalty of that interpretation. Executing a search yields
//! [`SearchResult`]s whose accuracy starts at the search penalty.

mod country;
mod near;
mod place;
mod poi;
mod postcode;

use mercator_data::{Geometry, PlaceRow};
use tracing::debug;

pub use country::CountrySearch;
pub use near::NearSearch;
pub use place::PlaceSearch;
pub use poi::PoiSearch;
pub use postcode::PostcodeSearch;

use crate::{
    connection::{Result, SearchConnection},
    results::{BaseResult, SearchResult},
    types::SearchDetails,
};

#[derive(Debug, Clone, PartialEq)]
pub enum AbstractSearch {
    Place(PlaceSearch),
    Postcode(PostcodeSearch),
    Country(CountrySearch),
    Poi(PoiSearch),
    Near(NearSearch),
}

impl AbstractSearch {
    pub fn penalty(&self) -> f64 {
        match self {
            Self::Place(s) => s.penalty,
            Self::Postcode(s) => s.penalty,
            Self::Country(s) => s.penalty,
            Self::Poi(s) => s.penalty,
            Self::Near(s) => s.penalty,
        }
    }

    pub fn penalty_mut(&mut self) -> &mut f64 {
        match self {
            Self::Place(s) => &mut s.penalty,
            Self::Postcode(s) => &mut s.penalty,
            Self::Country(s) => &mut s.penalty,
            Self::Poi(s) => &mut s.penalty,
            Self::Near(s) => &mut s.penalty,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Place(_) => "place",
            Self::Postcode(_) => "postcode",
            Self::Country(_) => "country",
            Self::Poi(_) => "poi",
            Self::Near(_) => "near",
        }
    }

    pub async fn execute<C: SearchConnection + ?Sized>(
        &self,
        conn: &C,
        details: &SearchDetails,
    ) -> Result<Vec<SearchResult>> {
        match self {
            Self::Near(search) => search.execute(conn, details).await,
            other => other.execute_simple(conn, details).await,
        }
    }

    /// Execute anything but a near search. Near searches wrap exactly one simple search.
    async fn execute_simple<C: SearchConnection + ?Sized>(
        &self,
        conn: &C,
        details: &SearchDetails,
    ) -> Result<Vec<SearchResult>> {
        match self {
            Self::Place(s) => s.execute(conn, details).await,
            Self::Postcode(s) => s.execute(conn, details).await,
            Self::Country(s) => s.execute(conn, details).await,
            Self::Poi(s) => s.execute(conn, details).await,
            Self::Near(_) => {
                debug!("Nested near search ignored");
                Ok(Vec::new())
            }
        }
    }
}

macro_rules! impl_from_search {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for AbstractSearch {
                fn from(search: $ty) -> Self {
                    Self::$variant(search)
                }
            }
        )*
    };
}

impl_from_search!(
    Place => PlaceSearch,
    Postcode => PostcodeSearch,
    Country => CountrySearch,
    Poi => PoiSearch,
    Near => NearSearch,
);

/// Penalty for lying outside an unbounded viewbox: 0 inside, 0.5 inside the doubled
/// viewbox, 1.0 elsewhere.
fn viewbox_penalty(geometry: &Geometry, details: &SearchDetails) -> f64 {
    match (details.viewbox, details.viewbox_x2()) {
        (Some(vb), Some(vb2)) if !details.bounded_viewbox => {
            if geometry.intersects_bbox(&vb) {
                0.0
            } else if geometry.intersects_bbox(&vb2) {
                0.5
            } else {
                1.0
            }
        }
        _ => 0.0,
    }
}

fn place_result(row: &PlaceRow, accuracy: f64) -> SearchResult {
    SearchResult {
        bbox: Some(row.geometry.bbox()),
        ..SearchResult::new(BaseResult::from_place(row), accuracy)
    }
}

//! Integration tests for the mercator geocoder
//!
//! These run against the public API on top of the sample test database and check the
//! behaviour that holds across modules: search planning, execution limits, result
//! ranking, reverse lookup and category search.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use mercator::{
    ForwardGeocoder, Geocoder, GeocoderConfigBuilder, MemoryConnection, Phrase, QueryAnalyzer,
    ReverseDetailsBuilder, SearchConnection, SearchDetails, SearchDetailsBuilder, SourceTable,
    StructuredQuery, TextTrace, WordTableAnalyzer,
    connection::{LineFilter, NameMatch, PlaceCondition, PlaceFilter, PostcodeFilter, Result},
    search::{
        AbstractSearch, SearchBuilder,
        fields::{FieldLookup, WeightedStrings},
        geocoder::MAX_EXECUTED_SEARCHES,
        query::{QueryStruct, TokenType},
        searches::CountrySearch,
        token_assignment::yield_token_assignments,
    },
};
use mercator_data::{
    AddressLineRow, Bbox, Category, CountryNameRow, InterpolationRow, PlaceId, PlaceRow, Point,
    PostcodeRow, SearchNameRow, TestDataConfig, TokenId, WordRow, create_test_database,
};

fn setup_test_env() {
    let _ = mercator::init_logging(tracing::Level::WARN);
}

fn memory_connection() -> Arc<MemoryConnection> {
    Arc::new(MemoryConnection::new(Arc::new(
        create_test_database(&TestDataConfig::sample()).expect("Should build test database"),
    )))
}

/// Counts the row queries that searches send and remembers the country filters.
struct CountingConnection {
    inner: Arc<MemoryConnection>,
    row_queries: AtomicUsize,
    countries: Mutex<Vec<Vec<String>>>,
}

impl CountingConnection {
    fn new() -> Self {
        Self {
            inner: memory_connection(),
            row_queries: AtomicUsize::new(0),
            countries: Mutex::new(Vec::new()),
        }
    }

    fn row_queries(&self) -> usize {
        self.row_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchConnection for CountingConnection {
    async fn lookup_words(&self, word_tokens: &[String]) -> Result<Vec<WordRow>> {
        self.inner.lookup_words(word_tokens).await
    }

    async fn words_by_id(&self, word_ids: &[TokenId]) -> Result<Vec<WordRow>> {
        self.inner.words_by_id(word_ids).await
    }

    async fn search_names(
        &self,
        lookups: &[FieldLookup],
        filter: &PlaceFilter,
    ) -> Result<Vec<NameMatch>> {
        self.row_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.search_names(lookups, filter).await
    }

    async fn places(&self, filter: &PlaceFilter) -> Result<Vec<Arc<PlaceRow>>> {
        self.row_queries.fetch_add(1, Ordering::SeqCst);
        for condition in &filter.conditions {
            if let PlaceCondition::Countries(codes) = condition {
                self.countries.lock().unwrap().push(codes.clone());
            }
        }
        self.inner.places(filter).await
    }

    async fn interpolations(&self, filter: &LineFilter) -> Result<Vec<Arc<InterpolationRow>>> {
        self.inner.interpolations(filter).await
    }

    async fn tiger(&self, filter: &LineFilter) -> Result<Vec<Arc<InterpolationRow>>> {
        self.inner.tiger(filter).await
    }

    async fn postcodes(&self, filter: &PostcodeFilter) -> Result<Vec<Arc<PostcodeRow>>> {
        self.inner.postcodes(filter).await
    }

    async fn country_names(&self, country_codes: &[String]) -> Result<Vec<Arc<CountryNameRow>>> {
        self.inner.country_names(country_codes).await
    }

    async fn country_grid_codes(&self, point: Point) -> Result<Vec<String>> {
        self.inner.country_grid_codes(point).await
    }

    async fn country_grid_envelope(&self, country_code: &str) -> Result<Option<Bbox>> {
        self.inner.country_grid_envelope(country_code).await
    }

    async fn address_lines(&self, place_id: PlaceId) -> Result<Vec<AddressLineRow>> {
        self.inner.address_lines(place_id).await
    }

    async fn search_vectors(&self, place_id: PlaceId) -> Result<Option<Arc<SearchNameRow>>> {
        self.inner.search_vectors(place_id).await
    }
}

fn country_search(penalty: f64, codes: &[&str]) -> AbstractSearch {
    CountrySearch::new(
        penalty,
        WeightedStrings::uniform(codes.iter().map(|c| (*c).to_owned())),
    )
    .into()
}

fn partial_token_ids(query: &QueryStruct, word: &str) -> Vec<TokenId> {
    query
        .iter_token_lists()
        .filter(|(_, _, tlist)| tlist.ttype == TokenType::Partial)
        .flat_map(|(_, _, tlist)| tlist.tokens.iter())
        .filter(|t| t.lookup_word == word)
        .map(|t| t.token)
        .collect()
}

#[tokio::test]
async fn test_house_number_folded_into_address_search() {
    setup_test_env();
    let conn = memory_connection();
    let analyzer = WordTableAnalyzer::new(conn.clone());
    let details = SearchDetails::default();
    let geocoder = ForwardGeocoder::new(conn.as_ref(), &analyzer, &details, None);

    let phrases = [Phrase::free("10 Downing Street"), Phrase::free("London")];
    let (query, searches) = geocoder
        .build_searches(&phrases)
        .await
        .expect("Should build searches");
    assert!(!searches.is_empty(), "Should plan searches for a street address");

    let downing = partial_token_ids(&query, "downing");
    let street = partial_token_ids(&query, "street");
    assert!(!downing.is_empty() && !street.is_empty(), "Street words are known");

    let folded = searches.iter().any(|search| match search {
        AbstractSearch::Place(place) => {
            let looked_up: Vec<TokenId> = place
                .lookups
                .iter()
                .flat_map(|l| l.tokens.iter().copied())
                .collect();
            place.housenumbers.is_empty()
                && downing.iter().any(|t| looked_up.contains(t))
                && street.iter().any(|t| looked_up.contains(t))
        }
        _ => false,
    });
    assert!(folded, "A search without house number filter covers Downing Street");
}

#[tokio::test]
async fn test_searches_are_planned_cheapest_first() {
    setup_test_env();
    let conn = memory_connection();
    let analyzer = WordTableAnalyzer::new(conn.clone());
    let details = SearchDetails::default();
    let geocoder = ForwardGeocoder::new(conn.as_ref(), &analyzer, &details, None);

    for text in ["Downing Street, London", "pub near Whitehall", "Deutschland"] {
        let (_, searches) = geocoder
            .build_searches(&[Phrase::free(text)])
            .await
            .expect("Should build searches");
        assert!(
            searches.windows(2).all(|w| w[0].penalty() <= w[1].penalty()),
            "Searches for '{text}' should be sorted by penalty"
        );
    }
}

#[tokio::test]
async fn test_normalized_rankings_start_at_zero() {
    setup_test_env();
    let conn = memory_connection();
    let analyzer = WordTableAnalyzer::new(conn.clone());
    let details = SearchDetails::default();

    let query = analyzer
        .analyze_query(&[Phrase::free("Downing Street Westminster London")])
        .await
        .expect("Should analyze query");
    let builder = SearchBuilder::new(&query, &details);

    let mut checked = 0;
    for assignment in yield_token_assignments(&query) {
        for range in assignment.address.iter().chain(assignment.name.iter()) {
            let (ranking, taken) = builder.get_addr_ranking(*range).normalized();
            assert!(taken >= 0.0);
            let penalties: Vec<f64> = std::iter::once(ranking.default)
                .chain(ranking.rankings.iter().map(|r| r.penalty))
                .collect();
            assert!(penalties.iter().all(|p| *p >= 0.0), "No negative penalty");
            assert!(
                penalties.iter().any(|p| *p == 0.0),
                "The best variant is rebased to zero"
            );
            checked += 1;
        }
    }
    assert!(checked > 0, "Should have seen address ranges");
}

#[tokio::test]
async fn test_execution_is_capped() {
    setup_test_env();
    let conn = CountingConnection::new();
    let analyzer = WordTableAnalyzer::new(memory_connection());
    let details = SearchDetails::default();
    let geocoder = ForwardGeocoder::new(&conn, &analyzer, &details, None);
    let query = QueryStruct::new(vec![Phrase::free("united kingdom")]);

    let searches: Vec<_> = (0..MAX_EXECUTED_SEARCHES + 10)
        .map(|_| country_search(0.1, &["gb"]))
        .collect();
    let results = geocoder
        .execute_searches(&query, &searches)
        .await
        .expect("Should execute searches");

    assert_eq!(results.len(), 1, "Identical results are merged");
    assert_eq!(conn.row_queries(), MAX_EXECUTED_SEARCHES);
}

#[tokio::test]
async fn test_execution_honours_deadline() {
    setup_test_env();
    let conn = CountingConnection::new();
    let analyzer = WordTableAnalyzer::new(memory_connection());
    let details = SearchDetails::default();
    let geocoder = ForwardGeocoder::new(&conn, &analyzer, &details, Some(Duration::ZERO));
    let query = QueryStruct::new(vec![Phrase::free("x")]);

    let searches: Vec<_> = (0..5).map(|_| country_search(0.1, &["gb"])).collect();
    geocoder
        .execute_searches(&query, &searches)
        .await
        .expect("Should execute searches");
    assert_eq!(conn.row_queries(), 1, "Only the first search runs");
}

#[tokio::test]
async fn test_cheaper_search_executes_first() {
    setup_test_env();
    let conn = CountingConnection::new();
    let analyzer = WordTableAnalyzer::new(memory_connection());
    let details = SearchDetails::default();
    let trace = TextTrace::new();
    let geocoder = ForwardGeocoder::new(&conn, &analyzer, &details, None).with_trace(&trace);
    let query = QueryStruct::new(vec![Phrase::free("deutschland")]);

    // Handed over in the wrong order on purpose.
    let searches = vec![country_search(0.4, &["de"]), country_search(0.1, &["de"])];
    let results = geocoder
        .execute_searches(&query, &searches)
        .await
        .expect("Should execute searches");

    assert_eq!(results.len(), 1);
    assert!((results[0].accuracy - 0.1).abs() < 1e-9, "First run comes from 0.1");

    let report = trace.get_buffer();
    let first = report.find("penalty: 0.1").expect("0.1 search should run");
    if let Some(second) = report.find("penalty: 0.4") {
        assert!(first < second, "0.1 runs before 0.4");
    }
    assert!(!conn.countries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicates_keep_best_accuracy() {
    setup_test_env();
    let conn = memory_connection();
    let analyzer = WordTableAnalyzer::new(conn.clone());
    let details = SearchDetails::default();
    let geocoder = ForwardGeocoder::new(conn.as_ref(), &analyzer, &details, None);
    let query = QueryStruct::new(vec![Phrase::free("x")]);

    let searches = vec![country_search(0.22, &["de", "gb"]), country_search(0.2, &["de"])];
    let results = geocoder
        .execute_searches(&query, &searches)
        .await
        .expect("Should execute searches");

    let de = results
        .iter()
        .find(|r| r.base.country_code.as_deref() == Some("de"))
        .expect("Germany should be found");
    assert!((de.accuracy - 0.2).abs() < 1e-9);
    let gb = results
        .iter()
        .find(|r| r.base.country_code.as_deref() == Some("gb"))
        .expect("Great Britain should be found");
    assert!((gb.accuracy - 0.22).abs() < 1e-9);
}

#[tokio::test]
async fn test_sort_and_cut_is_stable_on_real_results() {
    setup_test_env();
    let conn = memory_connection();
    let analyzer = WordTableAnalyzer::new(conn.clone());
    let details = SearchDetails::default();
    let geocoder = ForwardGeocoder::new(conn.as_ref(), &analyzer, &details, None);

    let (query, searches) = geocoder
        .build_searches(&[Phrase::free("London")])
        .await
        .expect("Should build searches");
    let results = geocoder
        .execute_searches(&query, &searches)
        .await
        .expect("Should execute searches");
    assert!(!results.is_empty());

    let once = geocoder.sort_and_cut_results(results);
    let twice = geocoder.sort_and_cut_results(once.clone());
    assert_eq!(once, twice);
}

#[tokio::test]
async fn test_full_workflow() {
    setup_test_env();
    let geocoder = Geocoder::from_connection(memory_connection());

    // Free text
    let details = SearchDetailsBuilder::new()
        .max_results(3)
        .details()
        .address_details(true)
        .done()
        .build()
        .expect("Should build details");
    let results = geocoder
        .search("Downing Street, London", &details)
        .await
        .expect("Search should work");
    assert!(results.len() <= 3, "Should respect max_results");
    let street = results
        .iter()
        .find(|r| r.base.place_id == Some(3))
        .expect("Downing Street should be found");
    assert!(street.base.address_rows.is_some());

    // Structured
    let structured = StructuredQuery {
        street: Some("Downing Street".into()),
        city: Some("London".into()),
        ..StructuredQuery::default()
    };
    let results = geocoder
        .search_address(&structured, &SearchDetails::default())
        .await
        .expect("Structured search should work");
    assert!(results.iter().any(|r| r.base.place_id == Some(3)));

    // Reverse
    let reverse = geocoder
        .reverse(
            Point::new(-0.12758, 51.50345),
            &ReverseDetailsBuilder::new().build(),
        )
        .await
        .expect("Reverse should work")
        .expect("Should find a house");
    assert_eq!(reverse.base.housenumber.as_deref(), Some("10"));
}

#[tokio::test]
async fn test_reverse_falls_back_to_country() {
    setup_test_env();
    let geocoder = Geocoder::from_connection(memory_connection());
    let details = ReverseDetailsBuilder::new().max_rank(4).build();

    let result = geocoder
        .reverse(Point::new(10.0, 50.0), &details)
        .await
        .expect("Reverse should work")
        .expect("Germany should be found");
    assert_eq!(result.base.category, Category::new("place", "country"));
    assert_eq!(result.base.rank_address, 4);
    assert_eq!(result.base.country_code.as_deref(), Some("de"));
}

#[tokio::test]
async fn test_reverse_outside_countries_with_restriction() {
    setup_test_env();
    let geocoder = Geocoder::from_connection(memory_connection()).with_config(
        GeocoderConfigBuilder::strict()
            .build()
            .expect("Should build config"),
    );
    let result = geocoder
        .reverse(Point::new(-30.0, 0.0), &ReverseDetailsBuilder::new().build())
        .await
        .expect("Reverse should work");
    assert!(result.is_none(), "Nothing in the open ocean");
}

#[tokio::test]
async fn test_reverse_finds_interpolation_away_from_streets() {
    setup_test_env();
    let geocoder = Geocoder::from_connection(memory_connection());

    let result = geocoder
        .reverse(Point::new(13.385, 52.5003), &ReverseDetailsBuilder::new().build())
        .await
        .expect("Reverse should work")
        .expect("Interpolation should be found");
    assert_eq!(result.base.source_table, SourceTable::Osmline);
    assert_eq!(result.base.place_id, Some(111));
    assert_eq!(result.base.housenumber.as_deref(), Some("21"));
}

#[tokio::test]
async fn test_reverse_house_and_interpolation_compete_on_distance() {
    setup_test_env();
    let geocoder = Geocoder::from_connection(memory_connection());
    let details = ReverseDetailsBuilder::new().build();

    let house = geocoder
        .reverse(Point::new(13.388, 52.516824), &details)
        .await
        .expect("Reverse should work")
        .expect("House should be found");
    assert_eq!(house.base.source_table, SourceTable::Placex);
    assert_eq!(house.base.housenumber.as_deref(), Some("5"));

    let interpolation = geocoder
        .reverse(Point::new(13.3878, 52.5164), &details)
        .await
        .expect("Reverse should work")
        .expect("Interpolation should be found");
    assert_eq!(interpolation.base.source_table, SourceTable::Osmline);
    assert_eq!(interpolation.base.place_id, Some(110));
}

#[tokio::test]
async fn test_category_search_needs_geography() {
    setup_test_env();
    let geocoder = Geocoder::from_connection(memory_connection());
    let pubs = [Category::new("amenity", "pub")];

    let results = geocoder
        .search_category(&pubs, None, &SearchDetails::default())
        .await
        .expect("Category search should work");
    assert!(results.is_empty(), "No phrase and no point gives nothing");

    let around = SearchDetailsBuilder::new()
        .near(Point::new(-0.1265, 51.5045))
        .near_radius(0.01)
        .build()
        .expect("Should build details");
    let results = geocoder
        .search_category(&pubs, None, &around)
        .await
        .expect("Category search should work");
    assert!(results.iter().any(|r| r.base.category == pubs[0]));
}

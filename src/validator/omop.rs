//! OMOP CDM check catalog
//!
//! Per-table integrity checks for the clinical warehouse, qualified with the
//! target schema. Only `location` uses strictly portable SQL; the others rely
//! on Postgres date arithmetic and functions.

use std::sync::Arc;

use super::predicates::{
    concept_domain, date_order, foreign_key_exists, primary_key_unique, CountPredicate,
};
use super::{Predicate, ValidatorRegistry};

fn location(schema: &str) -> Vec<Arc<dyn Predicate>> {
    let table = format!("{schema}.location");
    let complete_duplicates = {
        let table = table.clone();
        CountPredicate::new(
            "location_complete_duplicates",
            format!(
                "SELECT CAST(COALESCE(SUM(n - 1), 0) AS BIGINT) FROM (\
                 SELECT COUNT(*) AS n FROM {table} \
                 GROUP BY city, state, location_source_value, address_1, address_2, county, zip\
                 ) AS grouped"
            ),
            move |n| {
                format!(
                    "Found {} complete duplicate rows in {}. Remove duplicate entries to ensure data integrity.",
                    n, table
                )
            },
        )
    };
    let address_duplicates = CountPredicate::new(
        "location_address_duplicates",
        format!(
            "SELECT COUNT(*) FROM (\
             SELECT address_1, city, state, zip FROM {table} \
             GROUP BY address_1, city, state, zip HAVING COUNT(*) > 1\
             ) AS dup"
        ),
        |n| {
            format!(
                "Found {} duplicate entries in the 'location' table with the same combination of address_1, city, state, and zip.",
                n
            )
        },
    );

    vec![
        primary_key_unique(&table, "location_id"),
        complete_duplicates.into_arc(),
        address_duplicates.into_arc(),
    ]
}

fn care_site(schema: &str) -> Vec<Arc<dyn Predicate>> {
    vec![
        primary_key_unique(&format!("{schema}.care_site"), "care_site_id"),
        foreign_key_exists(
            &format!("{schema}.care_site"),
            "location_id",
            &format!("{schema}.location"),
            "location_id",
        ),
    ]
}

fn provider(schema: &str) -> Vec<Arc<dyn Predicate>> {
    vec![
        primary_key_unique(&format!("{schema}.provider"), "provider_id"),
        concept_domain(
            &format!("{schema}.provider"),
            "specialty_concept_id",
            &format!("{schema}.concept"),
            &["Provider", "Specialty"],
        ),
    ]
}

fn person(schema: &str) -> Vec<Arc<dyn Predicate>> {
    let birth_year = CountPredicate::new(
        "person_birth_year_plausibility",
        format!(
            "SELECT COUNT(*) FROM {schema}.person \
             WHERE year_of_birth < 1900 OR year_of_birth > EXTRACT(YEAR FROM CURRENT_DATE)"
        ),
        |n| {
            format!(
                "Found {} records in 'person' with a year_of_birth before 1900 or after the current year.",
                n
            )
        },
    );
    vec![
        primary_key_unique(&format!("{schema}.person"), "person_id"),
        birth_year.into_arc(),
    ]
}

fn visit_occurrence(schema: &str) -> Vec<Arc<dyn Predicate>> {
    let within_observation = CountPredicate::new(
        "visit_within_observation_period",
        format!(
            "SELECT COUNT(*) FROM {schema}.visit_occurrence v \
             JOIN {schema}.observation_period o ON v.person_id = o.person_id \
             WHERE v.visit_start_date < o.observation_period_start_date \
             OR v.visit_end_date > o.observation_period_end_date"
        ),
        |n| {
            format!(
                "Found {} visits in 'visit_occurrence' that fall outside the person's observation period.",
                n
            )
        },
    );
    vec![
        primary_key_unique(&format!("{schema}.visit_occurrence"), "visit_occurrence_id"),
        date_order(
            &format!("{schema}.visit_occurrence"),
            "visit_start_date",
            "visit_end_date",
        ),
        within_observation.into_arc(),
    ]
}

fn drug_exposure(schema: &str) -> Vec<Arc<dyn Predicate>> {
    let day_supply = CountPredicate::new(
        "drug_exposure_day_supply_consistency",
        format!(
            "SELECT COUNT(*) FROM {schema}.drug_exposure \
             WHERE days_supply IS NOT NULL \
             AND drug_exposure_end_date <> drug_exposure_start_date + (days_supply - 1)"
        ),
        |n| {
            format!(
                "Found {} drug exposure records where 'end_date' does not match 'start_date + days_supply - 1'.",
                n
            )
        },
    );
    vec![
        primary_key_unique(&format!("{schema}.drug_exposure"), "drug_exposure_id"),
        date_order(
            &format!("{schema}.drug_exposure"),
            "drug_exposure_start_date",
            "drug_exposure_end_date",
        ),
        day_supply.into_arc(),
    ]
}

fn measurement(schema: &str) -> Vec<Arc<dyn Predicate>> {
    let unit_domain = CountPredicate::new(
        "measurement_unit_domain",
        format!(
            "SELECT COUNT(*) FROM {schema}.measurement m \
             JOIN {schema}.concept u ON m.unit_concept_id = u.concept_id \
             WHERE m.value_as_number IS NOT NULL AND u.domain_id <> 'Unit'"
        ),
        |n| {
            format!(
                "Found {} measurement records where 'value_as_number' is set but 'unit_concept_id' is not in the 'Unit' domain.",
                n
            )
        },
    );
    vec![
        primary_key_unique(&format!("{schema}.measurement"), "measurement_id"),
        unit_domain.into_arc(),
    ]
}

fn observation(schema: &str) -> Vec<Arc<dyn Predicate>> {
    let type_not_null = CountPredicate::new(
        "observation_type_not_null",
        format!(
            "SELECT COUNT(*) FROM {schema}.observation WHERE observation_type_concept_id IS NULL"
        ),
        |n| {
            format!(
                "Found {} records in 'observation' with NULL 'observation_type_concept_id'.",
                n
            )
        },
    );
    vec![
        primary_key_unique(&format!("{schema}.observation"), "observation_id"),
        type_not_null.into_arc(),
    ]
}

/// Default catalog for the OMOP tables, qualified with `schema`
pub fn omop_registry(schema: &str) -> ValidatorRegistry {
    ValidatorRegistry::new()
        .with("location", location(schema))
        .with("care_site", care_site(schema))
        .with("provider", provider(schema))
        .with("person", person(schema))
        .with("visit_occurrence", visit_occurrence(schema))
        .with("drug_exposure", drug_exposure(schema))
        .with("measurement", measurement(schema))
        .with("observation", observation(schema))
}

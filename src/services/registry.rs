//! Public company registry / address geocoder proxy
//!
//! 외부 응답을 프론트엔드가 쓰는 평평한 구조로 변환해서 반환.
//! 업스트림 실패(네트워크, non-2xx, 디코드 실패)는 전부 502.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{ApiError, ApiResult};

/// 검색어 최소 길이
pub const MIN_QUERY_LEN: usize = 3;

// ============ Response shapes ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanySummary {
    pub siren: String,
    pub siret: Option<String>,
    pub name: String,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub legal_form: Option<String>,
    pub activity_code: Option<String>,
    pub created_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressSummary {
    pub label: String,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub city_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// ============ Upstream payloads ============

#[derive(Debug, Deserialize)]
pub struct CompanySearchResponse {
    #[serde(default)]
    pub results: Vec<CompanyRecord>,
}

#[derive(Debug, Deserialize)]
pub struct CompanyRecord {
    pub siren: String,
    #[serde(default)]
    pub nom_complet: Option<String>,
    #[serde(default)]
    pub nom_raison_sociale: Option<String>,
    #[serde(default)]
    pub nature_juridique: Option<String>,
    #[serde(default)]
    pub activite_principale: Option<String>,
    #[serde(default)]
    pub date_creation: Option<String>,
    #[serde(default)]
    pub siege: Option<CompanySeat>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompanySeat {
    #[serde(default)]
    pub siret: Option<String>,
    #[serde(default)]
    pub adresse: Option<String>,
    #[serde(default)]
    pub code_postal: Option<String>,
    #[serde(default)]
    pub libelle_commune: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddressSearchResponse {
    #[serde(default)]
    pub features: Vec<AddressFeature>,
}

#[derive(Debug, Deserialize)]
pub struct AddressFeature {
    pub properties: AddressProperties,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
pub struct AddressProperties {
    pub label: String,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub citycode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    /// GeoJSON 순서: [longitude, latitude]
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

pub fn reshape_companies(response: CompanySearchResponse) -> Vec<CompanySummary> {
    response
        .results
        .into_iter()
        .map(|record| {
            let seat = record.siege.unwrap_or_default();
            let name = record
                .nom_complet
                .or(record.nom_raison_sociale)
                .unwrap_or_else(|| record.siren.clone());

            CompanySummary {
                siren: record.siren,
                siret: seat.siret,
                name,
                address: seat.adresse,
                postal_code: seat.code_postal,
                city: seat.libelle_commune,
                legal_form: record.nature_juridique,
                activity_code: record.activite_principale,
                created_on: record.date_creation,
            }
        })
        .collect()
}

pub fn reshape_addresses(response: AddressSearchResponse) -> Vec<AddressSummary> {
    response
        .features
        .into_iter()
        .map(|feature| {
            let props = feature.properties;
            let coords = feature.geometry.map(|g| g.coordinates).unwrap_or_default();

            AddressSummary {
                label: props.label,
                street: props.street.or(props.name),
                postal_code: props.postcode,
                city: props.city,
                city_code: props.citycode,
                longitude: coords.first().copied(),
                latitude: coords.get(1).copied(),
            }
        })
        .collect()
}

/// 검색어 검증 (trim 후 3자 이상)
pub fn validate_query(q: Option<&str>) -> ApiResult<String> {
    let q = q.map(str::trim).unwrap_or_default();
    if q.chars().count() < MIN_QUERY_LEN {
        return Err(ApiError::BadRequest(format!(
            "q must be at least {} characters",
            MIN_QUERY_LEN
        )));
    }
    Ok(q.to_string())
}

pub struct RegistryClient {
    http: reqwest::Client,
    company_url: String,
    address_url: String,
}

impl RegistryClient {
    pub fn new(company_url: &str, address_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            company_url: company_url.trim_end_matches('/').to_string(),
            address_url: address_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn search_companies(&self, q: &str) -> ApiResult<Vec<CompanySummary>> {
        let response: CompanySearchResponse = self
            .http
            .get(format!("{}/search", self.company_url))
            .query(&[("q", q), ("page", "1"), ("per_page", "10")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| upstream_error("company registry", e))?
            .json()
            .await
            .map_err(|e| upstream_error("company registry", e))?;

        Ok(reshape_companies(response))
    }

    pub async fn search_addresses(&self, q: &str) -> ApiResult<Vec<AddressSummary>> {
        let response: AddressSearchResponse = self
            .http
            .get(format!("{}/search/", self.address_url))
            .query(&[("q", q), ("limit", "5")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| upstream_error("address API", e))?
            .json()
            .await
            .map_err(|e| upstream_error("address API", e))?;

        Ok(reshape_addresses(response))
    }
}

fn upstream_error(service: &str, e: reqwest::Error) -> ApiError {
    error!(service, error = %e, "Lookup upstream failed");
    ApiError::BadGateway(service.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reshape_companies() {
        let raw = r#"{
            "results": [{
                "siren": "552100554",
                "nom_complet": "ACME SAS",
                "nature_juridique": "5710",
                "activite_principale": "62.01Z",
                "date_creation": "2015-03-01",
                "siege": {
                    "siret": "55210055400013",
                    "adresse": "1 RUE DE LA PAIX 75002 PARIS",
                    "code_postal": "75002",
                    "libelle_commune": "PARIS"
                }
            }, {
                "siren": "123456789"
            }],
            "total_results": 2
        }"#;

        let companies = reshape_companies(serde_json::from_str(raw).unwrap());
        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].name, "ACME SAS");
        assert_eq!(companies[0].siret.as_deref(), Some("55210055400013"));
        assert_eq!(companies[0].city.as_deref(), Some("PARIS"));
        assert_eq!(companies[0].activity_code.as_deref(), Some("62.01Z"));
        // 이름이 없으면 siren
        assert_eq!(companies[1].name, "123456789");
        assert!(companies[1].postal_code.is_none());
    }

    #[test]
    fn test_reshape_addresses() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [2.3488, 48.8534]},
                "properties": {
                    "label": "8 Boulevard du Port 80000 Amiens",
                    "name": "8 Boulevard du Port",
                    "street": "Boulevard du Port",
                    "postcode": "80000",
                    "city": "Amiens",
                    "citycode": "80021"
                }
            }]
        }"#;

        let addresses = reshape_addresses(serde_json::from_str(raw).unwrap());
        assert_eq!(addresses.len(), 1);
        let a = &addresses[0];
        assert_eq!(a.street.as_deref(), Some("Boulevard du Port"));
        assert_eq!(a.city_code.as_deref(), Some("80021"));
        assert_eq!(a.longitude, Some(2.3488));
        assert_eq!(a.latitude, Some(48.8534));
    }

    #[test]
    fn test_validate_query() {
        assert!(validate_query(None).is_err());
        assert!(validate_query(Some("  ab ")).is_err());
        assert_eq!(validate_query(Some(" acme ")).unwrap(), "acme");
    }
}

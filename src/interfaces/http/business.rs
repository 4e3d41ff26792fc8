//! Business endpoints relayed through the correlation engine.
//!
//! The engine treats these payloads as opaque bytes. This module only checks
//! caller input before a transaction is created and gives each backend
//! response a shape to decode into.

use super::response::{ApiError, ApiResponse};
use crate::application::engine::{CallOptions, CorrelationEngine};
use crate::domain::transaction::{ApiType, TransactionId};
use crate::error::{GatewayError, Result};
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form backend data for endpoints whose result is only required to be an object.
pub type BackendData = Map<String, Value>;

/// A request accepted by one business endpoint.
pub trait BusinessRequest: Serialize + DeserializeOwned + Send + Sync + 'static {
    const API_TYPE: &'static str;
    type Response: Serialize + DeserializeOwned + Send;

    fn transaction_id_mut(&mut self) -> &mut Option<String>;

    /// Rejects malformed input before the engine is involved.
    fn validate(&self) -> Result<()>;
}

/// Validates, assigns the transaction id and relays `R` to the backend.
pub async fn relay<R: BusinessRequest>(
    State(engine): State<CorrelationEngine>,
    request: std::result::Result<Json<R>, JsonRejection>,
) -> std::result::Result<Json<ApiResponse<R::Response>>, ApiError> {
    let Json(mut request) = request?;
    request.validate()?;

    let transaction_id = match request.transaction_id_mut().as_deref() {
        Some(raw) => TransactionId::parse(raw)?,
        None => TransactionId::generate(),
    };
    *request.transaction_id_mut() = Some(transaction_id.to_string());

    let data = engine
        .call_json(
            ApiType::new(R::API_TYPE),
            &request,
            CallOptions::new().transaction_id(transaction_id),
        )
        .await?;
    Ok(Json(ApiResponse::success(data)))
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GatewayError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// A search key counts as given only when it is non-blank.
fn given(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

fn digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

/// `inCarDt` must be a real calendar date written as `YYYYMMDD`.
fn validate_in_car_dt(value: &str) -> Result<()> {
    if digits(value, 8) && NaiveDate::parse_from_str(value, "%Y%m%d").is_ok() {
        Ok(())
    } else {
        Err(GatewayError::Validation(format!(
            "inCarDt must be YYYYMMDD, got {value:?}"
        )))
    }
}

fn validate_timestamp(field: &str, value: &str) -> Result<()> {
    if digits(value, 14) && NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S").is_ok() {
        Ok(())
    } else {
        Err(GatewayError::Validation(format!(
            "{field} must be YYYYMMDDHHMMSS, got {value:?}"
        )))
    }
}

fn validate_entry_key(in_car_dt: &str, in_car_seq_no: &str) -> Result<()> {
    validate_in_car_dt(in_car_dt)?;
    require("inCarSeqNo", in_car_seq_no)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InCarSearchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_no4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_no_n: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InCar {
    pub car_no: String,
    #[serde(flatten)]
    pub details: BackendData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InCarSearchResponse {
    pub in_car: Vec<InCar>,
}

impl BusinessRequest for InCarSearchRequest {
    const API_TYPE: &'static str = "incar.search";
    type Response = InCarSearchResponse;

    fn transaction_id_mut(&mut self) -> &mut Option<String> {
        &mut self.transaction_id
    }

    fn validate(&self) -> Result<()> {
        let (car_no4, car_no_n) = (given(&self.car_no4), given(&self.car_no_n));
        let present = [given(&self.car_no), car_no4, car_no_n]
            .into_iter()
            .flatten()
            .count();
        if present != 1 {
            return Err(GatewayError::Validation(
                "exactly one of carNo, carNo4, carNoN is required".to_string(),
            ));
        }
        if let Some(last4) = car_no4
            && !digits(last4, 4)
        {
            return Err(GatewayError::Validation(
                "carNo4 must be the last 4 digits of the plate".to_string(),
            ));
        }
        if let Some(numeric) = car_no_n
            && !numeric.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(GatewayError::Validation(
                "carNoN must be numeric".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountInfo {
    pub dc_ticket_cd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc_qty: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeCalculationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub in_car_dt: String,
    pub in_car_seq_no: String,
    pub out_scheduled_tm: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discount_info: Vec<DiscountInfo>,
}

impl BusinessRequest for FeeCalculationRequest {
    const API_TYPE: &'static str = "fee.calculate";
    type Response = BackendData;

    fn transaction_id_mut(&mut self) -> &mut Option<String> {
        &mut self.transaction_id
    }

    fn validate(&self) -> Result<()> {
        validate_entry_key(&self.in_car_dt, &self.in_car_seq_no)?;
        validate_timestamp("outScheduledTm", &self.out_scheduled_tm)?;
        for info in &self.discount_info {
            require("discountInfo.dcTicketCd", &info.dc_ticket_cd)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountAddRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub in_car_dt: String,
    pub in_car_seq_no: String,
    pub dc_ticket_cd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc_qty: Option<u32>,
}

impl BusinessRequest for DiscountAddRequest {
    const API_TYPE: &'static str = "discount.add";
    type Response = BackendData;

    fn transaction_id_mut(&mut self) -> &mut Option<String> {
        &mut self.transaction_id
    }

    fn validate(&self) -> Result<()> {
        validate_entry_key(&self.in_car_dt, &self.in_car_seq_no)?;
        require("dcTicketCd", &self.dc_ticket_cd)?;
        if self.dc_qty == Some(0) {
            return Err(GatewayError::Validation(
                "dcQty must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountSearchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub in_car_dt: String,
    pub in_car_seq_no: String,
}

impl BusinessRequest for DiscountSearchRequest {
    const API_TYPE: &'static str = "discount.search";
    type Response = BackendData;

    fn transaction_id_mut(&mut self) -> &mut Option<String> {
        &mut self.transaction_id
    }

    fn validate(&self) -> Result<()> {
        validate_entry_key(&self.in_car_dt, &self.in_car_seq_no)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountDeleteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub in_car_dt: String,
    pub in_car_seq_no: String,
    pub dc_seq_no: String,
}

impl BusinessRequest for DiscountDeleteRequest {
    const API_TYPE: &'static str = "discount.delete";
    type Response = BackendData;

    fn transaction_id_mut(&mut self) -> &mut Option<String> {
        &mut self.transaction_id
    }

    fn validate(&self) -> Result<()> {
        validate_entry_key(&self.in_car_dt, &self.in_car_seq_no)?;
        require("dcSeqNo", &self.dc_seq_no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search(body: Value) -> InCarSearchRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_incar_search_requires_exactly_one_key() {
        assert!(search(json!({"carNo": "11가1234"})).validate().is_ok());
        assert!(search(json!({"carNo4": "1234"})).validate().is_ok());
        assert!(search(json!({"carNoN": "111234"})).validate().is_ok());

        assert!(search(json!({})).validate().is_err());
        assert!(search(json!({"carNo": ""})).validate().is_err());
        assert!(
            search(json!({"carNo": "11가1234", "carNo4": "1234"}))
                .validate()
                .is_err()
        );
        assert!(search(json!({"carNo4": "12a4"})).validate().is_err());
        assert!(search(json!({"carNoN": "11가"})).validate().is_err());
    }

    #[test]
    fn test_incar_search_ignores_empty_alternatives() {
        assert!(
            search(json!({"carNo": "11가1234", "carNo4": ""}))
                .validate()
                .is_ok()
        );
        assert!(
            search(json!({"carNoN": "111234", "carNo4": "  "}))
                .validate()
                .is_ok()
        );
        match search(json!({"carNo4": ""})).validate() {
            Err(GatewayError::Validation(msg)) => assert!(msg.starts_with("exactly one")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_incar_search_serializes_camel_case() {
        let request = search(json!({"carNo4": "1234", "transactionId": "T1"}));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"transactionId": "T1", "carNo4": "1234"})
        );
    }

    #[test]
    fn test_fee_calculation_validation() {
        let valid: FeeCalculationRequest = serde_json::from_value(json!({
            "inCarDt": "20240229",
            "inCarSeqNo": "17",
            "outScheduledTm": "20240229183000",
            "discountInfo": [{"dcTicketCd": "DC01", "dcQty": 1}]
        }))
        .unwrap();
        assert!(valid.validate().is_ok());

        let mut bad_date = valid.clone();
        bad_date.in_car_dt = "20230229".into();
        assert!(bad_date.validate().is_err());

        let mut bad_time = valid.clone();
        bad_time.out_scheduled_tm = "202402291830".into();
        assert!(bad_time.validate().is_err());

        let mut missing_seq = valid;
        missing_seq.in_car_seq_no = " ".into();
        assert!(missing_seq.validate().is_err());
    }

    #[test]
    fn test_discount_validation() {
        let add = DiscountAddRequest {
            transaction_id: None,
            in_car_dt: "20240101".into(),
            in_car_seq_no: "3".into(),
            dc_ticket_cd: "".into(),
            dc_qty: None,
        };
        assert!(add.validate().is_err());

        let delete = DiscountDeleteRequest {
            transaction_id: None,
            in_car_dt: "20240101".into(),
            in_car_seq_no: "3".into(),
            dc_seq_no: "9".into(),
        };
        assert!(delete.validate().is_ok());
    }

    #[test]
    fn test_incar_response_keeps_extra_fields() {
        let response: InCarSearchResponse = serde_json::from_value(json!({
            "inCar": [{"carNo": "11가1234", "inCarDt": "20240101", "inCarSeqNo": "7"}]
        }))
        .unwrap();
        assert_eq!(response.in_car[0].car_no, "11가1234");
        assert_eq!(response.in_car[0].details["inCarSeqNo"], json!("7"));
    }
}

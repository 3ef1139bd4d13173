//! Typed endpoints of the daycare backend
//!
//! Record payloads stay as [`serde_json::Value`]: the backend owns their shape.

use crate::error::Result;
use crate::interceptor::AuthenticatedClient;
use serde_json::{json, Value};
use std::fmt::Display;

/// Resource endpoints, all dispatched through the authenticated client
#[derive(Clone, Copy)]
pub struct Api<'a> {
    client: &'a AuthenticatedClient,
}

impl AuthenticatedClient {
    pub fn api(&self) -> Api<'_> {
        Api { client: self }
    }
}

impl<'a> Api<'a> {
    // Children

    pub async fn list_children(&self) -> Result<Vec<Value>> {
        self.client.get_json("/api/babies/babies").await
    }

    pub async fn add_child(&self, child: &Value) -> Result<Value> {
        self.client.post_json("/api/babies/addbaby", child).await
    }

    pub async fn delete_child(&self, id: impl Display) -> Result<()> {
        self.client.delete(&format!("/api/babies/baby/{id}")).await
    }

    // Babysitters

    pub async fn list_babysitters(&self) -> Result<Vec<Value>> {
        self.client.get_json("/api/babysitters/babysitters").await
    }

    pub async fn add_babysitter(&self, babysitter: &Value) -> Result<Value> {
        self.client.post_json("/api/babysitters/add-babysitter", babysitter).await
    }

    pub async fn delete_babysitter(&self, id: impl Display) -> Result<()> {
        self.client.delete(&format!("/api/babysitters/babysitter/{id}")).await
    }

    // Schedules

    pub async fn list_schedules(&self) -> Result<Vec<Value>> {
        self.client.get_json("/api/schedules/allschedules").await
    }

    pub async fn schedules_for_babysitter(&self, babysitter_id: impl Display) -> Result<Vec<Value>> {
        self.client
            .get_json(&format!("/api/schedules/babysitter/{babysitter_id}"))
            .await
    }

    pub async fn add_schedule(&self, schedule: &Value) -> Result<Value> {
        self.client.post_json("/api/schedules/addschedule", schedule).await
    }

    pub async fn update_schedule(&self, id: impl Display, schedule: &Value) -> Result<Value> {
        self.client
            .put_json(&format!("/api/schedules/updateschedule/{id}"), schedule)
            .await
    }

    pub async fn delete_schedule(&self, id: impl Display) -> Result<()> {
        self.client.delete(&format!("/api/schedules/delete/{id}")).await
    }

    // Payments

    pub async fn list_payments(&self) -> Result<Vec<Value>> {
        self.client.get_json("/api/payments/allpayments").await
    }

    pub async fn generate_payment(&self, payment: &Value) -> Result<Value> {
        self.client.post_json("/api/payments/generatepayment", payment).await
    }

    pub async fn update_payment_status(&self, id: impl Display, status: &str) -> Result<Value> {
        self.client
            .put_json(&format!("/api/payments/{id}/status"), &json!({ "status": status }))
            .await
    }

    pub async fn delete_payment(&self, id: impl Display) -> Result<()> {
        self.client.delete(&format!("/api/payments/{id}")).await
    }

    // Incidents

    pub async fn list_incidents(&self) -> Result<Vec<Value>> {
        self.client.get_json("/api/incidents/incidents").await
    }

    pub async fn report_incident(&self, incident: &Value) -> Result<Value> {
        self.client.post_json("/api/incidents/report", incident).await
    }

    // Users

    pub async fn list_users(&self) -> Result<Vec<Value>> {
        self.client.get_json("/api/users/allusers").await
    }
}

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::errors::ClientResult;

/// API credit balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credits {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    /// Decimal balance as returned by the service
    pub credit: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_phone_sha256: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_free_credit: Option<bool>,
}

/// Prepaid package information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub package_type: String,
    pub total: i64,
    pub balance: i64,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

/// Account and billing operations
#[derive(Debug, Clone, Copy)]
pub struct AccountService<'a> {
    client: &'a Client,
}

impl<'a> AccountService<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Current API credit balance.
    pub async fn get_credits(&self, check_free_credit: bool) -> ClientResult<Credits> {
        let path = if check_free_credit {
            "/wallet/self/api-credit?check_free_credit=true"
        } else {
            "/wallet/self/api-credit"
        };

        self.client
            .request_json(Method::GET, path, None::<&()>, None)
            .await
    }

    pub async fn get_package(&self) -> ClientResult<Package> {
        self.client
            .request_json(Method::GET, "/wallet/self/package", None::<&()>, None)
            .await
    }
}

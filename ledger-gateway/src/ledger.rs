//! Typed façade over the positional contract surface.

use chaincode::{
    CallerContext, EventRecord, EventType, HistoryEntry, RegisterTourist, TouristPage,
    TouristRecord, TouristUpdate, VerificationResult,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::SubmissionClient;
use crate::error::Result;
use crate::gateway::ChainTx;

/// A decoded contract result plus where it was committed.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub chain_tx: ChainTx,
}

#[derive(Clone)]
pub struct TouristLedger {
    client: SubmissionClient,
}

impl TouristLedger {
    pub fn new(client: SubmissionClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SubmissionClient {
        &self.client
    }

    async fn submit<T: DeserializeOwned>(
        &self,
        caller: &CallerContext,
        function: &str,
        args: Vec<String>,
    ) -> Result<Committed<T>> {
        let receipt = self.client.submit(caller, function, args).await?;
        Ok(Committed {
            value: receipt.decode()?,
            chain_tx: receipt.chain_tx,
        })
    }

    async fn evaluate<T: DeserializeOwned>(
        &self,
        caller: &CallerContext,
        function: &str,
        args: &[String],
    ) -> Result<T> {
        let bytes = self.client.evaluate(caller, function, args).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn register(
        &self,
        caller: &CallerContext,
        request: &RegisterTourist,
    ) -> Result<Committed<TouristRecord>> {
        let args = vec![
            request.tourist_id.clone(),
            request.kyc_hash.clone(),
            serde_json::to_string(&request.itinerary)?,
            serde_json::to_string(&request.emergency_contacts)?,
            request.expiry_at.clone(),
            serde_json::to_string(&request.metadata)?,
        ];
        self.submit(caller, "RegisterTourist", args).await
    }

    pub async fn record_event(
        &self,
        caller: &CallerContext,
        event_type: EventType,
        event_id: &str,
        tourist_id: &str,
        payload: &Value,
    ) -> Result<Committed<EventRecord>> {
        let args = vec![
            event_id.to_string(),
            tourist_id.to_string(),
            serde_json::to_string(payload)?,
        ];
        self.submit(caller, event_type.function_name(), args).await
    }

    pub async fn update(
        &self,
        caller: &CallerContext,
        tourist_id: &str,
        update: &TouristUpdate,
    ) -> Result<Committed<TouristRecord>> {
        let args = vec![tourist_id.to_string(), serde_json::to_string(update)?];
        self.submit(caller, "UpdateTourist", args).await
    }

    pub async fn suspend(
        &self,
        caller: &CallerContext,
        tourist_id: &str,
        reason: Option<&str>,
    ) -> Result<Committed<TouristRecord>> {
        let args = vec![tourist_id.to_string(), reason.unwrap_or_default().to_string()];
        self.submit(caller, "SuspendTourist", args).await
    }

    pub async fn revoke(
        &self,
        caller: &CallerContext,
        tourist_id: &str,
        reason: Option<&str>,
    ) -> Result<Committed<TouristRecord>> {
        let args = vec![tourist_id.to_string(), reason.unwrap_or_default().to_string()];
        self.submit(caller, "RevokeTourist", args).await
    }

    pub async fn reinstate(
        &self,
        caller: &CallerContext,
        tourist_id: &str,
    ) -> Result<Committed<TouristRecord>> {
        self.submit(caller, "ReinstateTourist", vec![tourist_id.to_string()])
            .await
    }

    /// Verify without writing anything.
    pub async fn verify(
        &self,
        caller: &CallerContext,
        tourist_id: &str,
    ) -> Result<VerificationResult> {
        self.evaluate(caller, "VerifyTourist", &[tourist_id.to_string()])
            .await
    }

    /// Verify and commit the `lastVerified` stamp.
    pub async fn verify_and_stamp(
        &self,
        caller: &CallerContext,
        tourist_id: &str,
    ) -> Result<Committed<VerificationResult>> {
        self.submit(caller, "VerifyTourist", vec![tourist_id.to_string()])
            .await
    }

    pub async fn get(&self, caller: &CallerContext, tourist_id: &str) -> Result<TouristRecord> {
        self.evaluate(caller, "GetTourist", &[tourist_id.to_string()])
            .await
    }

    pub async fn exists(&self, caller: &CallerContext, tourist_id: &str) -> Result<bool> {
        self.evaluate(caller, "TouristExists", &[tourist_id.to_string()])
            .await
    }

    pub async fn query_tourists(
        &self,
        caller: &CallerContext,
        query: &Value,
    ) -> Result<Vec<TouristRecord>> {
        self.evaluate(caller, "QueryTourists", &[query.to_string()])
            .await
    }

    pub async fn query_by_kyc_hash(
        &self,
        caller: &CallerContext,
        kyc_hash: &str,
    ) -> Result<Vec<TouristRecord>> {
        self.evaluate(caller, "QueryByKycHash", &[kyc_hash.to_string()])
            .await
    }

    pub async fn query_events(
        &self,
        caller: &CallerContext,
        query: &Value,
    ) -> Result<Vec<EventRecord>> {
        self.evaluate(caller, "QueryEvents", &[query.to_string()])
            .await
    }

    pub async fn history(
        &self,
        caller: &CallerContext,
        tourist_id: &str,
    ) -> Result<Vec<HistoryEntry>> {
        self.evaluate(caller, "GetTouristHistory", &[tourist_id.to_string()])
            .await
    }

    pub async fn list(
        &self,
        caller: &CallerContext,
        page_size: u32,
        bookmark: Option<&str>,
    ) -> Result<TouristPage> {
        let args = [page_size.to_string(), bookmark.unwrap_or_default().to_string()];
        self.evaluate(caller, "GetAllTourists", &args).await
    }

    pub async fn get_event(&self, caller: &CallerContext, event_id: &str) -> Result<EventRecord> {
        self.evaluate(caller, "GetEvent", &[event_id.to_string()])
            .await
    }

    pub async fn compute_kyc_hash(&self, caller: &CallerContext, payload: &Value) -> Result<String> {
        self.evaluate(caller, "ComputeKycHash", &[payload.to_string()])
            .await
    }
}

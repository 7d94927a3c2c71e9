//! Authorization database and session database of one e-mobility provider
//!
//! Answers "may this identification use the network at all", independently of
//! which EVSE it will end up on. Both maps are concurrent; every mutation is a
//! single per-key atomic operation, so no outer lock is needed.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::application::events::SharedEventBus;
use crate::domain::events::{AuthorizationEvent, ChargeDetailRecordForwardedEvent};
use crate::domain::results::authorization::{INVALID_TOKEN_FOR_SESSION, UNKNOWN_TOKEN};
use crate::domain::{
    AuthStartResult, AuthStopResult, ChargeDetailRecord, ChargingProductId, Event,
    Identification, OperatorId, ProviderId, SendCdrResult, SessionId, SessionInfo,
    TokenAuthStatus,
};
use crate::support::SharedClock;

pub struct AuthorizationRegistry {
    provider_id: ProviderId,
    clock: SharedClock,
    tokens: DashMap<Identification, TokenAuthStatus>,
    sessions: DashMap<SessionId, SessionInfo>,
    events: Option<SharedEventBus>,
}

pub type SharedAuthorizationRegistry = Arc<AuthorizationRegistry>;

impl AuthorizationRegistry {
    pub fn new(provider_id: ProviderId, clock: SharedClock) -> Self {
        Self {
            provider_id,
            clock,
            tokens: DashMap::new(),
            sessions: DashMap::new(),
            events: None,
        }
    }

    /// Publish every authorization decision on `events`.
    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// Register a token. Returns `false` if it was already known; the stored
    /// status is left unchanged in that case.
    pub fn add_token(&self, identification: Identification, status: TokenAuthStatus) -> bool {
        match self.tokens.entry(identification) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                debug!(identification = %slot.key(), %status, "Token added");
                slot.insert(status);
                true
            }
        }
    }

    pub fn remove_token(&self, identification: &Identification) -> Option<TokenAuthStatus> {
        self.tokens.remove(identification).map(|(_, status)| status)
    }

    /// Remove a token only while it still has the `expected` status.
    pub fn remove_token_if(&self, identification: &Identification, expected: TokenAuthStatus) -> bool {
        self.tokens
            .remove_if(identification, |_, status| *status == expected)
            .is_some()
    }

    pub fn token_status(&self, identification: &Identification) -> Option<TokenAuthStatus> {
        self.tokens.get(identification).map(|status| *status)
    }

    pub fn session(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.sessions.get(session_id).map(|info| info.clone())
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Allow another identification to stop `session_id` (car sharing).
    pub fn add_permitted_stopper(&self, session_id: &SessionId, identification: Identification) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut info) => {
                info.permitted_stoppers.insert(identification);
                true
            }
            None => false,
        }
    }

    pub fn authorize_start(
        &self,
        identification: &Identification,
        charging_product: Option<ChargingProductId>,
        session_id: Option<SessionId>,
        operator_id: Option<OperatorId>,
    ) -> AuthStartResult {
        let stored = self.token_status(identification);
        let result = match stored {
            None => AuthStartResult::NotAuthorized {
                reason: UNKNOWN_TOKEN.to_string(),
            },
            Some(TokenAuthStatus::Authorized) => {
                let session_id = session_id.unwrap_or_else(SessionId::random);
                let info = SessionInfo::new(
                    session_id.clone(),
                    identification.clone(),
                    operator_id,
                    charging_product,
                    self.clock.now(),
                );
                self.sessions.insert(session_id.clone(), info);
                info!(%session_id, %identification, "Session authorized");
                AuthStartResult::Authorized {
                    session_id,
                    provider_id: self.provider_id.clone(),
                }
            }
            Some(TokenAuthStatus::Blocked) => AuthStartResult::Blocked,
            Some(TokenAuthStatus::NotAuthorized) => AuthStartResult::Unspecified,
        };

        let session_id = match &result {
            AuthStartResult::Authorized { session_id, .. } => Some(session_id.clone()),
            _ => None,
        };
        self.record("authorize_start", identification, session_id, stored, result.as_str());
        result
    }

    pub fn authorize_stop(
        &self,
        session_id: &SessionId,
        identification: &Identification,
        _operator_id: Option<OperatorId>,
    ) -> AuthStopResult {
        let stored = self.token_status(identification);
        let result = match self.sessions.get(session_id) {
            None => AuthStopResult::InvalidSessionId,
            Some(info) => match stored {
                Some(TokenAuthStatus::Blocked) => AuthStopResult::Blocked,
                Some(TokenAuthStatus::Authorized) if info.may_stop(identification) => {
                    AuthStopResult::Authorized {
                        session_id: session_id.clone(),
                        provider_id: self.provider_id.clone(),
                    }
                }
                Some(TokenAuthStatus::Authorized) => AuthStopResult::NotAuthorized {
                    reason: INVALID_TOKEN_FOR_SESSION.to_string(),
                },
                None => AuthStopResult::NotAuthorized {
                    reason: UNKNOWN_TOKEN.to_string(),
                },
                Some(TokenAuthStatus::NotAuthorized) => AuthStopResult::Unspecified,
            },
        };

        self.record(
            "authorize_stop",
            identification,
            Some(session_id.clone()),
            stored,
            result.as_str(),
        );
        result
    }

    /// Correlate a charge detail record with its session. The session entry is
    /// consumed, so a second record for the same session is rejected.
    pub fn send_charge_detail_record(&self, cdr: &ChargeDetailRecord) -> SendCdrResult {
        let result = match self.sessions.remove(&cdr.session_id) {
            Some((session_id, _)) => {
                info!(%session_id, evse_id = %cdr.evse_id, "Charge detail record forwarded");
                if let Some(events) = &self.events {
                    events.publish(Event::ChargeDetailRecordForwarded(
                        ChargeDetailRecordForwardedEvent {
                            session_id: session_id.clone(),
                            reservation_id: cdr.reservation_id.clone(),
                            timestamp: self.clock.now(),
                        },
                    ));
                }
                SendCdrResult::Forwarded { session_id }
            }
            None => {
                debug!(session_id = %cdr.session_id, "Charge detail record for unknown session");
                SendCdrResult::InvalidSessionId
            }
        };
        metrics::counter!(
            "auth_requests_total",
            "operation" => "send_charge_detail_record",
            "result" => result.as_str()
        )
        .increment(1);
        result
    }

    fn record(
        &self,
        operation: &'static str,
        identification: &Identification,
        session_id: Option<SessionId>,
        stored_status: Option<TokenAuthStatus>,
        result: &'static str,
    ) {
        metrics::counter!("auth_requests_total", "operation" => operation, "result" => result)
            .increment(1);
        if let Some(events) = &self.events {
            events.publish(Event::AuthorizationResult(AuthorizationEvent {
                operation: operation.to_string(),
                identification: identification.to_string(),
                session_id,
                stored_status,
                result: result.to_string(),
                timestamp: self.clock.now(),
            }));
        }
    }
}

impl std::fmt::Debug for AuthorizationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationRegistry")
            .field("provider_id", &self.provider_id)
            .field("tokens", &self.tokens.len())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::domain::{ChargingSession, EvseId, SessionTime};
    use crate::support::system_clock;
    use chrono::Utc;

    fn registry() -> AuthorizationRegistry {
        AuthorizationRegistry::new(ProviderId::new("DE-GDF").unwrap(), system_clock())
    }

    fn token(value: &str) -> Identification {
        Identification::auth_token(value).unwrap()
    }

    fn cdr_for(session_id: &SessionId) -> ChargeDetailRecord {
        ChargingSession {
            id: session_id.clone(),
            evse_id: EvseId::new("E1").unwrap(),
            provider_id: ProviderId::new("DE-GDF").unwrap(),
            identification: token("T1"),
            charging_product: None,
            reservation: None,
            session_time: SessionTime::starting_at(Utc::now()),
        }
        .into_charge_detail_record(Utc::now())
    }

    #[test]
    fn start_stop_and_cdr_scenario() {
        let registry = registry();
        assert!(registry.add_token(token("T1"), TokenAuthStatus::Authorized));

        let started = registry.authorize_start(&token("T1"), None, None, None);
        let session_id = match started {
            AuthStartResult::Authorized { session_id, provider_id } => {
                assert_eq!(provider_id.as_str(), "DE-GDF");
                session_id
            }
            other => panic!("unexpected {:?}", other),
        };

        assert!(registry
            .authorize_stop(&session_id, &token("T1"), None)
            .is_authorized());

        let cdr = cdr_for(&session_id);
        assert_eq!(
            registry.send_charge_detail_record(&cdr),
            SendCdrResult::Forwarded {
                session_id: session_id.clone()
            }
        );
        assert_eq!(
            registry.authorize_stop(&session_id, &token("T1"), None),
            AuthStopResult::InvalidSessionId
        );
        assert_eq!(
            registry.send_charge_detail_record(&cdr),
            SendCdrResult::InvalidSessionId
        );
    }

    #[test]
    fn unknown_and_blocked_tokens() {
        let registry = registry();
        registry.add_token(token("BAD"), TokenAuthStatus::Blocked);
        registry.add_token(token("MEH"), TokenAuthStatus::NotAuthorized);

        assert_eq!(
            registry.authorize_start(&token("NOPE"), None, None, None),
            AuthStartResult::NotAuthorized {
                reason: UNKNOWN_TOKEN.to_string()
            }
        );
        assert_eq!(
            registry.authorize_start(&token("BAD"), None, None, None),
            AuthStartResult::Blocked
        );
        assert_eq!(
            registry.authorize_start(&token("MEH"), None, None, None),
            AuthStartResult::Unspecified
        );
        assert!(registry.session_ids().is_empty());
    }

    #[test]
    fn supplied_session_id_is_used() {
        let registry = registry();
        registry.add_token(token("T1"), TokenAuthStatus::Authorized);
        let id = SessionId::new("given").unwrap();
        let result = registry.authorize_start(&token("T1"), None, Some(id.clone()), None);
        assert_eq!(
            result,
            AuthStartResult::Authorized {
                session_id: id.clone(),
                provider_id: ProviderId::new("DE-GDF").unwrap(),
            }
        );
        assert_eq!(registry.session(&id).unwrap().started_by, token("T1"));
    }

    #[test]
    fn stop_checks_session_and_stopper() {
        let registry = registry();
        registry.add_token(token("STARTER"), TokenAuthStatus::Authorized);
        registry.add_token(token("OTHER"), TokenAuthStatus::Authorized);
        registry.add_token(token("BLOCKED"), TokenAuthStatus::Blocked);
        let id = SessionId::new("S").unwrap();
        registry.authorize_start(&token("STARTER"), None, Some(id.clone()), None);

        assert_eq!(
            registry.authorize_stop(&SessionId::new("missing").unwrap(), &token("STARTER"), None),
            AuthStopResult::InvalidSessionId
        );
        assert_eq!(
            registry.authorize_stop(&id, &token("OTHER"), None),
            AuthStopResult::NotAuthorized {
                reason: INVALID_TOKEN_FOR_SESSION.to_string()
            }
        );
        assert_eq!(
            registry.authorize_stop(&id, &token("STRANGER"), None),
            AuthStopResult::NotAuthorized {
                reason: UNKNOWN_TOKEN.to_string()
            }
        );
        assert_eq!(
            registry.authorize_stop(&id, &token("BLOCKED"), None),
            AuthStopResult::Blocked
        );

        assert!(registry.add_permitted_stopper(&id, token("OTHER")));
        assert!(registry.authorize_stop(&id, &token("OTHER"), None).is_authorized());
    }

    #[test]
    fn add_is_test_and_set_and_remove_is_compare_and_remove() {
        let registry = registry();
        assert!(registry.add_token(token("T"), TokenAuthStatus::Authorized));
        assert!(!registry.add_token(token("T"), TokenAuthStatus::Blocked));
        assert_eq!(registry.token_status(&token("T")), Some(TokenAuthStatus::Authorized));

        assert!(!registry.remove_token_if(&token("T"), TokenAuthStatus::Blocked));
        assert!(registry.remove_token_if(&token("T"), TokenAuthStatus::Authorized));
        assert_eq!(registry.remove_token(&token("T")), None);
    }

    #[test]
    fn concurrent_adds_admit_one_winner() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let status = if i % 2 == 0 {
                        TokenAuthStatus::Authorized
                    } else {
                        TokenAuthStatus::Blocked
                    };
                    registry.add_token(token("SHARED"), status)
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|added| *added)
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn decisions_are_published() {
        let events = create_event_bus(16);
        let mut subscriber = events.subscribe();
        let registry = registry().with_events(events.clone());
        registry.authorize_start(&token("NOPE"), None, None, None);

        let message = subscriber.try_recv().expect("event");
        match message.event {
            Event::AuthorizationResult(e) => {
                assert_eq!(e.operation, "authorize_start");
                assert_eq!(e.result, "NotAuthorized");
                assert_eq!(e.stored_status, None);
            }
            other => panic!("unexpected {}", other.event_type()),
        }
    }
}

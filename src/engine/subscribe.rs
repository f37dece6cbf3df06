//! SUBSCRIBE and UNSUBSCRIBE pipeline
//!
//! Filters keep their packet order end to end: parse and policy
//! failures mark their entry with a reason code but never shrink the
//! list, so the SUBACK always answers every requested filter.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{Error, Protocol};
use crate::auth::{AclAction, Access};
use crate::hooks::HookFlow;
use crate::protocol::{
    Packet, Properties, ReasonCode, SubAck, Subscribe, UnsubAck, Unsubscribe,
};
use crate::topic::{self, ParsedFilter};

impl Protocol {
    pub(crate) async fn handle_subscribe(&mut self, subscribe: Subscribe) -> Result<(), Error> {
        let mut entries: Vec<(Option<ParsedFilter>, ReasonCode)> =
            Vec::with_capacity(subscribe.filters.len());

        for sub in &subscribe.filters {
            match topic::parse(&sub.filter, sub.options) {
                Ok(parsed) => {
                    let code = self.zone.check_sub(&parsed);
                    entries.push((Some(parsed), code));
                }
                Err(cause) => {
                    debug!(client_id = %self.client_id, filter = %sub.filter, cause, "bad filter");
                    entries.push((None, ReasonCode::TopicFilterInvalid));
                }
            }
        }

        if self.enable_acl && !self.is_super {
            let credentials = self.credentials();
            for (parsed, code) in entries.iter_mut() {
                if code.is_error() {
                    continue;
                }
                if let Some(parsed) = parsed {
                    let verdict = self
                        .access_control
                        .check_acl(&credentials, AclAction::Subscribe, &parsed.filter)
                        .await;
                    if verdict == Access::Deny {
                        debug!(
                            client_id = %self.client_id,
                            filter = %parsed.filter,
                            "subscribe denied by ACL"
                        );
                        if let Some(metrics) = &self.metrics {
                            metrics.acl_denials_total.inc();
                        }
                        *code = ReasonCode::NotAuthorized;
                    }
                }
            }
        }

        let surviving: Vec<ParsedFilter> = entries
            .iter()
            .filter(|(_, code)| code.is_success())
            .filter_map(|(parsed, _)| parsed.clone())
            .collect();

        let hooks = Arc::clone(&self.hooks);
        if hooks.on_client_subscribe(&self.client(), &surviving).await == HookFlow::Stop {
            debug!(client_id = %self.client_id, "subscribe stopped by hook");
            let reason_codes =
                vec![ReasonCode::ImplementationError; subscribe.filters.len()];
            return self.send_suback(subscribe.packet_id, reason_codes);
        }

        let mut reason_codes: Vec<ReasonCode> =
            entries.iter().map(|(_, code)| *code).collect();

        let to_session: Vec<ParsedFilter> = surviving
            .into_iter()
            .map(|mut parsed| {
                parsed.options.qos = parsed.options.qos.min(self.zone.max_qos);
                parsed.filter = self.mount_topic(&parsed.filter);
                parsed
            })
            .collect();

        if !to_session.is_empty() {
            let session = match &self.session {
                Some(session) => Arc::clone(session),
                None => return Err(Error::NotConnected),
            };
            if let Err(e) = session
                .subscribe(subscribe.packet_id, subscribe.properties.clone(), to_session)
                .await
            {
                warn!(client_id = %self.client_id, error = %e, "session subscribe failed");
                for code in reason_codes.iter_mut() {
                    if code.is_success() {
                        *code = ReasonCode::UnspecifiedError;
                    }
                }
            }
        }

        self.send_suback(subscribe.packet_id, reason_codes)
    }

    pub(crate) async fn handle_unsubscribe(
        &mut self,
        unsubscribe: Unsubscribe,
    ) -> Result<(), Error> {
        let hooks = Arc::clone(&self.hooks);
        if hooks
            .on_client_unsubscribe(&self.client(), &unsubscribe.filters)
            .await
            == HookFlow::Stop
        {
            debug!(client_id = %self.client_id, "unsubscribe stopped by hook");
            let reason_codes =
                vec![ReasonCode::ImplementationError; unsubscribe.filters.len()];
            return self.send_unsuback(unsubscribe.packet_id, reason_codes);
        }

        let mounted: Vec<String> = unsubscribe
            .filters
            .iter()
            .map(|filter| self.mount_topic(filter))
            .collect();

        let mut reason_codes = vec![ReasonCode::Success; unsubscribe.filters.len()];

        let session = match &self.session {
            Some(session) => Arc::clone(session),
            None => return Err(Error::NotConnected),
        };
        if let Err(e) = session.unsubscribe(unsubscribe.packet_id, mounted).await {
            warn!(client_id = %self.client_id, error = %e, "session unsubscribe failed");
            reason_codes = vec![ReasonCode::UnspecifiedError; unsubscribe.filters.len()];
        }

        self.send_unsuback(unsubscribe.packet_id, reason_codes)
    }

    fn send_suback(&mut self, packet_id: u16, reason_codes: Vec<ReasonCode>) -> Result<(), Error> {
        self.send_packet(&Packet::SubAck(SubAck {
            packet_id,
            reason_codes,
            properties: Properties::default(),
        }))
    }

    fn send_unsuback(
        &mut self,
        packet_id: u16,
        reason_codes: Vec<ReasonCode>,
    ) -> Result<(), Error> {
        self.send_packet(&Packet::UnsubAck(UnsubAck {
            packet_id,
            reason_codes,
            properties: Properties::default(),
        }))
    }
}

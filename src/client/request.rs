/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/5/25
******************************************************************************/

/// Work sent to the running client loop by the subscription handles and the client itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubscriptionRequest {
    /// Control requests are queued on the session and must be written.
    Flush,
    /// The requested max frequency of an active subscription changed.
    Reconfigure(usize),
    /// The notification format or trigger of an MPN subscription changed.
    ModifyMpn(String, &'static str),
    /// The application asked to close the session.
    Disconnect,
}

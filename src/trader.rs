use crate::{account::AccountContext, exchange::Exchange, noun::*};

/// Session bound to one wallet and one trading pair. Holds no state besides
/// the connectivity client; balances and constraints are fetched per call.
pub struct Trader<E> {
    exchange: E,
    account: AccountContext,
}

impl<E: Exchange> Trader<E> {
    pub fn new(exchange: E, account: AccountContext) -> Self {
        Self { exchange, account }
    }

    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub(crate) fn symbol(&self) -> Symbol {
        self.account.pair.symbol()
    }
}

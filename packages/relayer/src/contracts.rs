//! Bridge token and relay forwarder ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings.

use alloy::sol;

sol! {
    /// Bridge token: owner-or-forwarder mint, holder burn
    #[sol(rpc)]
    contract BridgeToken {
        /// Mint `amount` to `to`; callable by the owner through the trusted forwarder
        function mint(address to, uint256 amount) external;

        function burn(uint256 amount) external;

        function balanceOf(address account) external view returns (uint256);

        /// Emitted by `burn`; the relay re-mints `amount` to `account` on the paired chain
        event TokensBurned(address indexed account, uint256 amount);

        event TokensMinted(address indexed to, uint256 amount);
    }
}

sol! {
    /// ERC-2771 sponsored-call forwarder used by the relay service
    #[sol(rpc)]
    contract RelayForwarder {
        /// Next meta-transaction nonce for `account`
        function userNonce(address account) external view returns (uint256);
    }
}

sol! {
    /// EIP-712 payload signed by the relayer for a sponsored ERC-2771 call
    struct SponsoredCallERC2771 {
        uint256 chainId;
        address target;
        bytes data;
        address user;
        uint256 userNonce;
        uint256 userDeadline;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::{SolCall, SolEvent, SolStruct};

    #[test]
    fn test_mint_selector() {
        // mint(address,uint256)
        assert_eq!(BridgeToken::mintCall::SELECTOR, [0x40, 0xc1, 0x0f, 0x19]);
    }

    #[test]
    fn test_tokens_burned_topic() {
        assert_eq!(
            BridgeToken::TokensBurned::SIGNATURE_HASH,
            alloy::primitives::keccak256(b"TokensBurned(address,uint256)")
        );
    }

    #[test]
    fn test_sponsored_call_type_string() {
        assert_eq!(
            SponsoredCallERC2771::eip712_root_type(),
            "SponsoredCallERC2771(uint256 chainId,address target,bytes data,address user,uint256 userNonce,uint256 userDeadline)"
        );
    }
}

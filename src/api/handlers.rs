use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use utoipa::{IntoParams, ToSchema};

use crate::blockchain::{Address, Block, Node, NodeError, Transaction, TransactionRequest};
use crate::network::{self, ChainSnapshot, Peer, PeerClient};

/// Shared state of one node process
pub struct AppState {
    /// Chain and mempool; every mutation goes through this lock
    pub node: Mutex<Node>,

    /// Fixed peer set
    pub peers: Vec<Peer>,

    /// Transport used to reach the peers
    pub client: Arc<dyn PeerClient>,
}

impl AppState {
    pub fn new(node: Node, peers: Vec<Peer>, client: Arc<dyn PeerClient>) -> Self {
        AppState {
            node: Mutex::new(node),
            peers,
            client,
        }
    }
}

/// Data structure for the node state
pub type NodeData = web::Data<AppState>;

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    /// Whether the chain is valid
    pub valid: bool,

    /// Human readable verdict
    pub message: String,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The admitted transaction with its assigned identifier
    pub transaction: Transaction,

    /// Peers that accepted the broadcast
    pub updated_nodes: Vec<Peer>,
}

/// Query for the mine endpoint
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MineQuery {
    /// Receiver of the block reward, defaults to this node's miner address
    pub miner_address: Option<String>,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub new_block: Block,

    /// Relative difficulty of the block's target
    pub difficulty: f64,

    /// Peers that accepted the block
    pub updated_nodes: Vec<Peer>,
}

/// Body of `POST /update_mempool`: one transaction or a whole pool
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
pub enum MempoolUpdate {
    Pool(Vec<Transaction>),
    Single(Transaction),
}

/// Response for the replace chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReplaceChainResponse {
    /// Whether a peer chain was adopted
    pub replaced: bool,

    /// Length of the chain now held
    pub length: usize,

    /// The chain now held
    pub chain: Vec<Block>,
}

/// Get the full node state
#[utoipa::path(
    get,
    path = "/node",
    responses(
        (status = 200, description = "Node state retrieved successfully", body = NodeSnapshot)
    )
)]
pub async fn get_node(state: NodeData) -> impl Responder {
    let snapshot = state.node.lock().await.snapshot();
    HttpResponse::Ok().json(snapshot)
}

/// Get the chain and its length
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainSnapshot)
    )
)]
pub async fn get_chain(state: NodeData) -> impl Responder {
    let chain = state.node.lock().await.chain().to_vec();
    HttpResponse::Ok().json(ChainSnapshot::new(chain))
}

/// Get all pending transactions
#[utoipa::path(
    get,
    path = "/mempool",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_mempool(state: NodeData) -> impl Responder {
    let mempool = state.node.lock().await.mempool().to_vec();
    HttpResponse::Ok().json(mempool)
}

/// Validate the local chain
#[utoipa::path(
    get,
    path = "/validate_chain",
    responses(
        (status = 200, description = "Chain validation status", body = ValidationResponse)
    )
)]
pub async fn validate_chain(state: NodeData) -> impl Responder {
    let node = state.node.lock().await;

    let response = match node.validator().check_chain(node.chain()) {
        Ok(()) => ValidationResponse {
            valid: true,
            message: "Blockchain valid".to_string(),
        },
        Err(err) => ValidationResponse {
            valid: false,
            message: format!("Blockchain invalid: {}", err),
        },
    };

    HttpResponse::Ok().json(response)
}

/// Submit a new transaction
///
/// Admits the transaction to the mempool and broadcasts it to every peer
#[utoipa::path(
    post,
    path = "/transaction",
    request_body = TransactionRequest,
    responses(
        (status = 200, description = "Transaction admitted", body = TransactionResponse),
        (status = 400, description = "Malformed or unbalanced transaction")
    )
)]
pub async fn new_transaction(
    state: NodeData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let transaction = Transaction::from(transaction_req.into_inner());

    let admitted = state.node.lock().await.admit_transaction(transaction);
    let transaction = match admitted {
        Ok(transaction) => transaction,
        Err(err) => return rejection(err),
    };

    let report = network::broadcast_transaction(state.client.as_ref(), &state.peers, &transaction).await;

    HttpResponse::Ok().json(TransactionResponse {
        transaction,
        updated_nodes: report.updated_peers(),
    })
}

/// Mine a new block
///
/// Runs proof-of-work off the request path, appends the block and broadcasts it
#[utoipa::path(
    get,
    path = "/mine",
    params(MineQuery),
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 409, description = "The chain advanced while mining"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_block(state: NodeData, query: web::Query<MineQuery>) -> impl Responder {
    let (job, miner_address, difficulty) = {
        let node = state.node.lock().await;
        let miner_address = query
            .into_inner()
            .miner_address
            .map(Address)
            .unwrap_or_else(|| node.identity().miner_address.clone());
        (node.prepare_block(&miner_address), miner_address, node.difficulty())
    };

    info!(
        "Mining block {} for {}",
        job.template.height, miner_address
    );

    let solved = match web::block(move || job.solve()).await {
        Ok(Ok(block)) => block,
        Ok(Err(err)) => return rejection(NodeError::from(err)),
        Err(err) => {
            error!("Mining worker failed: {}", err);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Mining worker failed"
            }));
        }
    };

    let committed = state.node.lock().await.commit_mined_block(solved);
    let new_block = match committed {
        Ok(block) => block,
        Err(err) => return rejection(err),
    };

    let report = network::broadcast_block(state.client.as_ref(), &state.peers, &new_block).await;

    HttpResponse::Ok().json(MineResponse {
        message: "New Block Mined".to_string(),
        new_block,
        difficulty,
        updated_nodes: report.updated_peers(),
    })
}

/// Receive transactions pushed by a peer
///
/// A single transaction is admitted; an array replaces the whole mempool
#[utoipa::path(
    post,
    path = "/update_mempool",
    request_body = Transaction,
    responses(
        (status = 200, description = "Mempool updated"),
        (status = 400, description = "Malformed or unbalanced transaction")
    )
)]
pub async fn update_mempool(state: NodeData, update: web::Json<MempoolUpdate>) -> impl Responder {
    let mut node = state.node.lock().await;

    let result = match update.into_inner() {
        MempoolUpdate::Single(transaction) => node.admit_transaction(transaction).map(|_| ()),
        MempoolUpdate::Pool(transactions) => node.replace_mempool(transactions),
    };

    match result {
        Ok(()) => HttpResponse::Ok().json(node.mempool()),
        Err(err) => rejection(err),
    }
}

/// Receive a block mined by a peer
#[utoipa::path(
    post,
    path = "/update_chain",
    request_body = Block,
    responses(
        (status = 200, description = "Block appended", body = Block),
        (status = 400, description = "Block does not extend the local tip")
    )
)]
pub async fn update_chain(state: NodeData, block: web::Json<Block>) -> impl Responder {
    let block = block.into_inner();
    let accepted = state.node.lock().await.accept_remote_block(block.clone());

    match accepted {
        Ok(()) => HttpResponse::Ok().json(block),
        Err(err) => rejection(err),
    }
}

/// Run fork choice against every peer
///
/// Adopts the longest valid peer chain if it is strictly longer than ours
#[utoipa::path(
    get,
    path = "/replace_chain",
    responses(
        (status = 200, description = "Fork choice completed", body = ReplaceChainResponse)
    )
)]
pub async fn replace_chain(state: NodeData) -> impl Responder {
    let (local_chain, validator) = {
        let node = state.node.lock().await;
        (node.chain().to_vec(), node.validator().clone())
    };

    let choice = network::fork_choice(state.client.as_ref(), &state.peers, &validator, &local_chain).await;

    let mut node = state.node.lock().await;
    let replaced = choice.replaced && node.replace_chain(choice.chain);

    HttpResponse::Ok().json(ReplaceChainResponse {
        replaced,
        length: node.chain().len(),
        chain: node.chain().to_vec(),
    })
}

fn rejection(err: NodeError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });

    match err {
        NodeError::UnbalancedTransaction(_) | NodeError::InvalidBlock(_) => {
            warn!("Rejected: {}", err);
            HttpResponse::BadRequest().json(body)
        }
        NodeError::StaleTip { .. } => {
            warn!("Discarded mined block: {}", err);
            HttpResponse::Conflict().json(body)
        }
        NodeError::Target(_) => {
            error!("{}", err);
            HttpResponse::InternalServerError().json(body)
        }
    }
}
